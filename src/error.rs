use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Crate-wide request error.
///
/// Domain-rule violations render as `{"errors": "<message>"}`, field
/// validation as `{"<field>": ["<message>"]}`, everything else as
/// `{"detail": "<message>"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{1}")]
    Field(&'static str, String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn field(field: &'static str, msg: impl Into<String>) -> Self {
        Self::Field(field, msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    fn status_and_body(&self) -> (StatusCode, serde_json::Value) {
        match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "errors": msg })),
            Self::Field(field, msg) => {
                let mut body = serde_json::Map::new();
                body.insert((*field).to_string(), json!([msg]));
                (StatusCode::BAD_REQUEST, serde_json::Value::Object(body))
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "detail": msg })),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "detail": msg })),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "detail": msg })),
            Self::Database(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
            }
            Self::Database(_) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "errors": "internal server error" }),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_))
            || matches!(self, Self::Database(ref e) if !matches!(e, sqlx::Error::RowNotFound))
        {
            error!(error = %self, "request failed");
        }
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

/// True when the database rejected a write with a unique constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400_with_errors_body() {
        let (status, body) = ApiError::validation("nope").status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "errors": "nope" }));
    }

    #[test]
    fn field_error_is_keyed_by_field() {
        let (status, body) = ApiError::field("cooking_time", "too small").status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "cooking_time": ["too small"] }));
    }

    #[test]
    fn auth_errors_use_detail_body() {
        let (status, body) = ApiError::Unauthorized("no token".into()).status_and_body();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "detail": "no token" }));

        let (status, _) = ApiError::Forbidden("not yours".into()).status_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, _) = ApiError::Database(sqlx::Error::RowNotFound).status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_database_errors_are_internal() {
        let (status, body) = ApiError::Database(sqlx::Error::PoolClosed).status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "errors": "internal server error" }));
    }
}
