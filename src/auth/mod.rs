use axum::Router;

use crate::state::AppState;

pub mod claims;
pub mod handlers;
pub mod jwt;
pub mod password;

pub fn router() -> Router<AppState> {
    handlers::router()
}
