use std::collections::{HashMap, HashSet};

use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{is_unique_violation, ApiError};
use crate::users::repo::User;

#[derive(Debug, Clone, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub author_id: Uuid,
    pub name: String,
    pub text: String,
    pub image_key: String,
    pub cooking_time: i32,
    pub pub_date: OffsetDateTime,
}

/// One ingredient of a recipe, joined with its catalog entry.
#[derive(Debug, Clone, FromRow)]
pub struct RecipeIngredientRow {
    pub ingredient_id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Cart line used by the shopping list aggregation.
#[derive(Debug, Clone, FromRow)]
pub struct CartIngredientRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecipeShortRow {
    pub id: i64,
    pub name: String,
    pub image_key: String,
    pub cooking_time: i32,
}

/// Validated recipe attributes ready for persistence.
#[derive(Debug)]
pub struct RecipeInput {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<i64>,
    /// (ingredient id, amount) pairs, already checked for duplicates.
    pub ingredients: Vec<(i64, i32)>,
}

#[derive(Debug, Default)]
pub struct RecipeListFilter {
    pub author: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

// ---- Tags & ingredients ----

pub async fn list_tags(db: &PgPool) -> Result<Vec<Tag>, ApiError> {
    let rows = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags ORDER BY name")
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn get_tag(db: &PgPool, id: i64) -> Result<Option<Tag>, ApiError> {
    let tag = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(tag)
}

pub async fn list_ingredients(
    db: &PgPool,
    name_prefix: Option<&str>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows = match name_prefix {
        Some(prefix) => {
            sqlx::query_as::<_, Ingredient>(
                r#"
                SELECT id, name, measurement_unit
                FROM ingredients
                WHERE name LIKE $1 || '%'
                ORDER BY name
                "#,
            )
            .bind(prefix)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients ORDER BY name",
            )
            .fetch_all(db)
            .await?
        }
    };
    Ok(rows)
}

pub async fn get_ingredient(db: &PgPool, id: i64) -> Result<Option<Ingredient>, ApiError> {
    let ingredient = sqlx::query_as::<_, Ingredient>(
        "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(ingredient)
}

// ---- Recipes ----

pub async fn get_recipe(db: &PgPool, id: i64) -> Result<Option<Recipe>, ApiError> {
    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        SELECT id, author_id, name, text, image_key, cooking_time, pub_date
        FROM recipes
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(recipe)
}

pub async fn list_recipes(
    db: &PgPool,
    filter: &RecipeListFilter,
    viewer: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Recipe>, ApiError> {
    // An anonymous request asking for "my" favorites or cart can never
    // match anything.
    if viewer.is_none()
        && (filter.is_favorited == Some(true) || filter.is_in_shopping_cart == Some(true))
    {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT r.id, r.author_id, r.name, r.text, r.image_key, r.cooking_time, r.pub_date \
         FROM recipes r WHERE TRUE",
    );

    if let Some(author) = filter.author {
        qb.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id \
             WHERE rt.recipe_id = r.id AND t.slug = ANY(",
        )
        .push_bind(filter.tags.clone())
        .push("))");
    }
    if let (Some(include), Some(viewer)) = (filter.is_favorited, viewer) {
        push_membership_clause(&mut qb, "favorites", viewer, include);
    }
    if let (Some(include), Some(viewer)) = (filter.is_in_shopping_cart, viewer) {
        push_membership_clause(&mut qb, "shopping_cart", viewer, include);
    }

    qb.push(" ORDER BY r.pub_date DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<Recipe>().fetch_all(db).await?;
    Ok(rows)
}

fn push_membership_clause(
    qb: &mut QueryBuilder<Postgres>,
    table: &str,
    viewer: Uuid,
    include: bool,
) {
    qb.push(if include { " AND EXISTS" } else { " AND NOT EXISTS" });
    qb.push(format!(
        " (SELECT 1 FROM {table} m WHERE m.recipe_id = r.id AND m.user_id = "
    ));
    qb.push_bind(viewer);
    qb.push(")");
}

pub async fn create_recipe(
    db: &PgPool,
    author_id: Uuid,
    image_key: &str,
    input: &RecipeInput,
) -> Result<i64, ApiError> {
    let mut tx = db.begin().await?;

    ensure_tags_exist(&mut tx, &input.tags).await?;
    ensure_ingredients_exist(&mut tx, &input.ingredients).await?;

    let recipe_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO recipes (author_id, name, text, image_key, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(author_id)
    .bind(&input.name)
    .bind(&input.text)
    .bind(image_key)
    .bind(input.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    set_tags(&mut tx, recipe_id, &input.tags).await?;
    insert_ingredients(&mut tx, recipe_id, &input.ingredients).await?;

    tx.commit().await?;
    Ok(recipe_id)
}

/// Update a recipe in place. The tag set is replaced and the ingredient
/// rows are deleted and recreated rather than diffed.
pub async fn update_recipe(
    db: &PgPool,
    recipe_id: i64,
    image_key: Option<&str>,
    input: &RecipeInput,
) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;

    ensure_tags_exist(&mut tx, &input.tags).await?;
    ensure_ingredients_exist(&mut tx, &input.ingredients).await?;

    match image_key {
        Some(key) => {
            sqlx::query(
                "UPDATE recipes SET name = $2, text = $3, cooking_time = $4, image_key = $5 \
                 WHERE id = $1",
            )
            .bind(recipe_id)
            .bind(&input.name)
            .bind(&input.text)
            .bind(input.cooking_time)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query("UPDATE recipes SET name = $2, text = $3, cooking_time = $4 WHERE id = $1")
                .bind(recipe_id)
                .bind(&input.name)
                .bind(&input.text)
                .bind(input.cooking_time)
                .execute(&mut *tx)
                .await?;
        }
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    set_tags(&mut tx, recipe_id, &input.tags).await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    insert_ingredients(&mut tx, recipe_id, &input.ingredients).await?;

    tx.commit().await?;
    Ok(())
}

pub async fn delete_recipe(db: &PgPool, recipe_id: i64) -> Result<u64, ApiError> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

async fn ensure_tags_exist(
    tx: &mut Transaction<'_, Postgres>,
    tag_ids: &[i64],
) -> Result<(), ApiError> {
    let distinct: HashSet<i64> = tag_ids.iter().copied().collect();
    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(tag_ids.to_vec())
        .fetch_one(&mut **tx)
        .await?;
    if found as usize != distinct.len() {
        return Err(ApiError::field("tags", "tag does not exist"));
    }
    Ok(())
}

async fn ensure_ingredients_exist(
    tx: &mut Transaction<'_, Postgres>,
    ingredients: &[(i64, i32)],
) -> Result<(), ApiError> {
    let ids: Vec<i64> = ingredients.iter().map(|(id, _)| *id).collect();
    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(ids.clone())
        .fetch_one(&mut **tx)
        .await?;
    if found as usize != ids.len() {
        return Err(ApiError::field("ingredients", "ingredient does not exist"));
    }
    Ok(())
}

async fn set_tags(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    tag_ids: &[i64],
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO recipe_tags (recipe_id, tag_id) \
         SELECT $1, tag_id FROM UNNEST($2::bigint[]) AS t(tag_id) \
         ON CONFLICT DO NOTHING",
    )
    .bind(recipe_id)
    .bind(tag_ids.to_vec())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    ingredients: &[(i64, i32)],
) -> Result<(), ApiError> {
    let ids: Vec<i64> = ingredients.iter().map(|(id, _)| *id).collect();
    let amounts: Vec<i32> = ingredients.iter().map(|(_, amount)| *amount).collect();
    sqlx::query(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) \
         SELECT $1, ingredient_id, amount \
         FROM UNNEST($2::bigint[], $3::int[]) AS t(ingredient_id, amount)",
    )
    .bind(recipe_id)
    .bind(ids)
    .bind(amounts)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---- Read assembly ----

/// A recipe with everything the read representation needs.
#[derive(Debug)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub author: User,
    pub author_is_subscribed: bool,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<RecipeIngredientRow>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(FromRow)]
struct TaggedRow {
    recipe_id: i64,
    id: i64,
    name: String,
    color: String,
    slug: String,
}

#[derive(FromRow)]
struct IngredientJoinRow {
    recipe_id: i64,
    ingredient_id: i64,
    name: String,
    measurement_unit: String,
    amount: i32,
}

/// Batch-load authors, tags, ingredients and per-viewer flags for a page
/// of recipes.
pub async fn load_details(
    db: &PgPool,
    recipes: Vec<Recipe>,
    viewer: Option<Uuid>,
) -> Result<Vec<RecipeDetails>, ApiError> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }
    let recipe_ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let author_ids: Vec<Uuid> = {
        let mut ids: Vec<Uuid> = recipes.iter().map(|r| r.author_id).collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let authors: HashMap<Uuid, User> = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, username, first_name, last_name, password_hash, created_at
        FROM users
        WHERE id = ANY($1)
        "#,
    )
    .bind(author_ids.clone())
    .fetch_all(db)
    .await?
    .into_iter()
    .map(|u| (u.id, u))
    .collect();

    let mut tags_by_recipe: HashMap<i64, Vec<Tag>> = HashMap::new();
    let tag_rows = sqlx::query_as::<_, TaggedRow>(
        r#"
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(recipe_ids.clone())
    .fetch_all(db)
    .await?;
    for row in tag_rows {
        tags_by_recipe.entry(row.recipe_id).or_default().push(Tag {
            id: row.id,
            name: row.name,
            color: row.color,
            slug: row.slug,
        });
    }

    let mut ingredients_by_recipe: HashMap<i64, Vec<RecipeIngredientRow>> = HashMap::new();
    let ingredient_rows = sqlx::query_as::<_, IngredientJoinRow>(
        r#"
        SELECT ri.recipe_id, ri.ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
        "#,
    )
    .bind(recipe_ids.clone())
    .fetch_all(db)
    .await?;
    for row in ingredient_rows {
        ingredients_by_recipe
            .entry(row.recipe_id)
            .or_default()
            .push(RecipeIngredientRow {
                ingredient_id: row.ingredient_id,
                name: row.name,
                measurement_unit: row.measurement_unit,
                amount: row.amount,
            });
    }

    let favorited = membership_set(db, MembershipKind::Favorite, viewer, &recipe_ids).await?;
    let in_cart = membership_set(db, MembershipKind::ShoppingCart, viewer, &recipe_ids).await?;
    let subscribed =
        crate::users::repo::subscribed_targets(db, viewer, &author_ids).await?;

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("recipe author missing")))?;
        details.push(RecipeDetails {
            author_is_subscribed: subscribed.contains(&author.id),
            tags: tags_by_recipe.remove(&recipe.id).unwrap_or_default(),
            ingredients: ingredients_by_recipe.remove(&recipe.id).unwrap_or_default(),
            is_favorited: favorited.contains(&recipe.id),
            is_in_shopping_cart: in_cart.contains(&recipe.id),
            author,
            recipe,
        });
    }
    Ok(details)
}

// ---- Favorites & shopping cart ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipKind {
    Favorite,
    ShoppingCart,
}

impl MembershipKind {
    fn table(self) -> &'static str {
        match self {
            Self::Favorite => "favorites",
            Self::ShoppingCart => "shopping_cart",
        }
    }

    /// Human-readable set name used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Favorite => "favorites",
            Self::ShoppingCart => "shopping cart",
        }
    }
}

pub async fn add_membership(
    db: &PgPool,
    kind: MembershipKind,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<(), ApiError> {
    let sql = format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(recipe_id)
        .execute(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::validation(format!("recipe is already in {}", kind.display_name()))
            } else {
                e.into()
            }
        })?;
    Ok(())
}

/// Returns the number of removed rows; zero means the pair did not exist.
pub async fn remove_membership(
    db: &PgPool,
    kind: MembershipKind,
    user_id: Uuid,
    recipe_id: i64,
) -> Result<u64, ApiError> {
    let sql = format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(user_id)
        .bind(recipe_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

async fn membership_set(
    db: &PgPool,
    kind: MembershipKind,
    viewer: Option<Uuid>,
    recipe_ids: &[i64],
) -> Result<HashSet<i64>, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    let sql = format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        kind.table()
    );
    let rows: Vec<i64> = sqlx::query_scalar(&sql)
        .bind(viewer)
        .bind(recipe_ids.to_vec())
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// All cart lines of a user, in the order the recipe ingredient rows
/// were inserted. The shopping list aggregation depends on this order.
pub async fn cart_ingredients(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Vec<CartIngredientRow>, ApiError> {
    let rows = sqlx::query_as::<_, CartIngredientRow>(
        r#"
        SELECT i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        JOIN shopping_cart sc ON sc.recipe_id = ri.recipe_id
        WHERE sc.user_id = $1
        ORDER BY ri.id
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

// ---- Per-author recipe summaries ----

/// Most recent recipes of an author; `limit` of `None` returns all.
pub async fn recent_recipes(
    db: &PgPool,
    author_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<RecipeShortRow>, ApiError> {
    let rows = sqlx::query_as::<_, RecipeShortRow>(
        r#"
        SELECT id, name, image_key, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC
        LIMIT $2
        "#,
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn recipes_count(db: &PgPool, author_id: Uuid) -> Result<i64, ApiError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}
