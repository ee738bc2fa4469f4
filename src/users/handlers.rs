use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{
    CreateUserRequest, CreatedUserResponse, SetPasswordRequest, SubscribeQuery,
    SubscriptionUserResponse, SubscriptionsQuery, UserResponse,
};
use super::repo::{self, User};
use crate::auth::jwt::{AuthUser, OptionalAuthUser};
use crate::auth::password::{hash_password, verify_password};
use crate::error::ApiError;
use crate::pagination::Pagination;
use crate::recipes::dto::RecipeShortResponse;
use crate::recipes::repo as recipes_repo;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(me))
        .route("/users/set_password", post(set_password))
        .route("/users/subscriptions", get(subscriptions))
        .route("/users/:id", get(get_user))
        .route("/users/:id/subscribe", post(subscribe).delete(unsubscribe))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = User::list(&state.db, p.limit, p.offset).await?;
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let subscribed = repo::subscribed_targets(&state.db, viewer, &ids).await?;
    let items = users
        .iter()
        .map(|u| UserResponse::from_user(u, subscribed.contains(&u.id)))
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.validate()?;

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.email,
        &payload.username,
        &payload.first_name,
        &payload.last_name,
        &hash,
    )
    .await?;

    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    let is_subscribed = repo::is_subscribed(&state.db, viewer, user.id).await?;
    Ok(Json(UserResponse::from_user(&user, is_subscribed)))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found.".into()))?;
    Ok(Json(UserResponse::from_user(&user, false)))
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found.".into()))?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(ApiError::field("current_password", "wrong password"));
    }
    super::dto::validate_password(&payload.new_password)
        .map_err(|_| ApiError::field("new_password", "password is too short"))?;

    let hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user_id, &hash).await?;
    info!(user_id = %user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn subscriptions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SubscriptionsQuery>,
) -> Result<Json<Vec<SubscriptionUserResponse>>, ApiError> {
    let targets =
        repo::list_subscription_targets(&state.db, user_id, q.limit, q.offset).await?;
    let mut items = Vec::with_capacity(targets.len());
    for target in &targets {
        items.push(subscription_payload(&state, target, q.recipes_limit).await?);
    }
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(target_id): Path<Uuid>,
    Query(q): Query<SubscribeQuery>,
) -> Result<(StatusCode, Json<SubscriptionUserResponse>), ApiError> {
    if target_id == user_id {
        return Err(ApiError::validation("you cannot subscribe to yourself"));
    }
    let target = User::find_by_id(&state.db, target_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    repo::subscribe(&state.db, user_id, target.id).await?;

    info!(user_id = %user_id, target_id = %target.id, "subscription created");
    let payload = subscription_payload(&state, &target, q.recipes_limit).await?;
    Ok((StatusCode::CREATED, Json(payload)))
}

#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(target_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    User::find_by_id(&state.db, target_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    let removed = repo::unsubscribe(&state.db, user_id, target_id).await?;
    if removed == 0 {
        return Err(ApiError::validation("subscription does not exist"));
    }
    info!(user_id = %user_id, target_id = %target_id, "subscription removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Subscribed-to user plus their recipes, capped by `recipes_limit`.
async fn subscription_payload(
    state: &AppState,
    target: &User,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionUserResponse, ApiError> {
    let recipes = recipes_repo::recent_recipes(&state.db, target.id, recipes_limit).await?;
    let recipes_count = recipes_repo::recipes_count(&state.db, target.id).await?;
    Ok(SubscriptionUserResponse {
        email: target.email.clone(),
        id: target.id,
        username: target.username.clone(),
        first_name: target.first_name.clone(),
        last_name: target.last_name.clone(),
        is_subscribed: true,
        recipes: recipes
            .iter()
            .map(|r| RecipeShortResponse::from_row(r, state.storage.as_ref()))
            .collect(),
        recipes_count,
    })
}
