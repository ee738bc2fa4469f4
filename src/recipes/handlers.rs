use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use axum_extra::extract::Query as MultiQuery;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    IngredientResponse, RecipeRequest, RecipeResponse, RecipeShortResponse, TagResponse,
};
use super::filters::{IngredientListQuery, RecipeListQuery};
use super::repo::{self, MembershipKind, RecipeShortRow};
use super::shopping_list;
use crate::auth::jwt::{AuthUser, OptionalAuthUser};
use crate::error::ApiError;
use crate::images::{decode_base64_image, store_recipe_image};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/:id", get(get_tag))
        .route("/ingredients", get(list_ingredients))
        .route("/ingredients/:id", get(get_ingredient))
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/download_shopping_cart", get(download_shopping_cart))
        .route(
            "/recipes/:id",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/recipes/:id/favorite",
            axum::routing::post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/recipes/:id/shopping_cart",
            axum::routing::post(add_to_cart).delete(remove_from_cart),
        )
}

// ---- Tags & ingredients ----

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagResponse>>, ApiError> {
    let tags = repo::list_tags(&state.db).await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = repo::get_tag(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    Ok(Json(tag.into()))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(q): Query<IngredientListQuery>,
) -> Result<Json<Vec<IngredientResponse>>, ApiError> {
    let ingredients = repo::list_ingredients(&state.db, q.name.as_deref()).await?;
    Ok(Json(ingredients.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<IngredientResponse>, ApiError> {
    let ingredient = repo::get_ingredient(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    Ok(Json(ingredient.into()))
}

// ---- Recipes ----

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    MultiQuery(query): MultiQuery<RecipeListQuery>,
) -> Result<Json<Vec<RecipeResponse>>, ApiError> {
    let filter = query.filter()?;
    let recipes =
        repo::list_recipes(&state.db, &filter, viewer, query.limit, query.offset).await?;
    let details = repo::load_details(&state.db, recipes, viewer).await?;
    let items = details
        .into_iter()
        .map(|d| RecipeResponse::from_details(d, state.storage.as_ref()))
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeResponse>, ApiError> {
    Ok(Json(read_recipe(&state, id, viewer).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RecipeRequest>,
) -> Result<(StatusCode, Json<RecipeResponse>), ApiError> {
    payload.validate()?;
    let image = payload
        .image
        .as_deref()
        .ok_or_else(|| ApiError::field("image", "this field is required"))?;

    let decoded = decode_base64_image(image)?;
    let image_key = store_recipe_image(&state, decoded).await?;

    let recipe_id = match repo::create_recipe(&state.db, user_id, &image_key, &payload.to_input())
        .await
    {
        Ok(id) => id,
        Err(e) => {
            // The image was already uploaded; do not leave it orphaned.
            if let Err(cleanup) = state.storage.delete_object(&image_key).await {
                warn!(error = %cleanup, key = %image_key, "orphaned image cleanup failed");
            }
            return Err(e);
        }
    };

    info!(user_id = %user_id, recipe_id, "recipe created");
    let response = read_recipe(&state, recipe_id, Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RecipeRequest>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = repo::get_recipe(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    if recipe.author_id != user_id {
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".into(),
        ));
    }
    payload.validate()?;

    let new_image_key = match payload.image.as_deref() {
        Some(image) => {
            let decoded = decode_base64_image(image)?;
            Some(store_recipe_image(&state, decoded).await?)
        }
        None => None,
    };

    repo::update_recipe(&state.db, id, new_image_key.as_deref(), &payload.to_input()).await?;

    if new_image_key.is_some() {
        if let Err(e) = state.storage.delete_object(&recipe.image_key).await {
            warn!(error = %e, key = %recipe.image_key, "stale image cleanup failed");
        }
    }

    info!(user_id = %user_id, recipe_id = id, "recipe updated");
    Ok(Json(read_recipe(&state, id, Some(user_id)).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let recipe = repo::get_recipe(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    if recipe.author_id != user_id {
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".into(),
        ));
    }

    repo::delete_recipe(&state.db, id).await?;
    if let Err(e) = state.storage.delete_object(&recipe.image_key).await {
        warn!(error = %e, key = %recipe.image_key, "image cleanup failed");
    }

    info!(user_id = %user_id, recipe_id = id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- Favorites & shopping cart ----

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RecipeShortResponse>), ApiError> {
    add_membership(&state, MembershipKind::Favorite, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    remove_membership(&state, MembershipKind::Favorite, user_id, id).await
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RecipeShortResponse>), ApiError> {
    add_membership(&state, MembershipKind::ShoppingCart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    remove_membership(&state, MembershipKind::ShoppingCart, user_id, id).await
}

async fn add_membership(
    state: &AppState,
    kind: MembershipKind,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<(StatusCode, Json<RecipeShortResponse>), ApiError> {
    let recipe = repo::get_recipe(&state.db, recipe_id)
        .await?
        .ok_or_else(|| ApiError::validation("recipe does not exist"))?;

    repo::add_membership(&state.db, kind, user_id, recipe.id).await?;

    info!(user_id = %user_id, recipe_id, set = kind.display_name(), "membership added");
    let row = RecipeShortRow {
        id: recipe.id,
        name: recipe.name,
        image_key: recipe.image_key,
        cooking_time: recipe.cooking_time,
    };
    Ok((
        StatusCode::CREATED,
        Json(RecipeShortResponse::from_row(&row, state.storage.as_ref())),
    ))
}

async fn remove_membership(
    state: &AppState,
    kind: MembershipKind,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<StatusCode, ApiError> {
    repo::get_recipe(&state.db, recipe_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    let removed = repo::remove_membership(&state.db, kind, user_id, recipe_id).await?;
    if removed == 0 {
        return Err(ApiError::validation(format!(
            "recipe is not in {}",
            kind.display_name()
        )));
    }
    info!(user_id = %user_id, recipe_id, set = kind.display_name(), "membership removed");
    Ok(StatusCode::NO_CONTENT)
}

// ---- Shopping list export ----

#[instrument(skip(state))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let rows = repo::cart_ingredients(&state.db, user_id).await?;
    let items = shopping_list::aggregate(rows);

    let font_dir = state.config.pdf.font_dir.clone();
    let font_family = state.config.pdf.font_family.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        shopping_list::render_pdf(&items, &font_dir, &font_family)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;
    let pdf = rendered.map_err(ApiError::Internal)?;

    info!(user_id = %user_id, bytes = pdf.len(), "shopping list rendered");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shoppinglist.pdf\"".to_string(),
            ),
        ],
        pdf,
    ))
}

async fn read_recipe(
    state: &AppState,
    recipe_id: i64,
    viewer: Option<Uuid>,
) -> Result<RecipeResponse, ApiError> {
    let recipe = repo::get_recipe(&state.db, recipe_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;
    let details = repo::load_details(&state.db, vec![recipe], viewer)
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("recipe details missing")))?;
    Ok(RecipeResponse::from_details(
        details,
        state.storage.as_ref(),
    ))
}
