use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::repo::{Ingredient, RecipeDetails, RecipeInput, RecipeShortRow, Tag};
use crate::error::ApiError;
use crate::storage::StorageClient;
use crate::users::dto::UserResponse;

const NAME_MAX_LENGTH: usize = 200;

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            color: tag.color,
            slug: tag.slug,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

impl From<Ingredient> for IngredientResponse {
    fn from(ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
        }
    }
}

/// Ingredient line inside a recipe: the catalog entry flattened together
/// with the amount. `id` is the ingredient id, not the association row.
#[derive(Debug, Serialize)]
pub struct RecipeIngredientResponse {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub tags: Vec<TagResponse>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeResponse {
    pub fn from_details(details: RecipeDetails, storage: &dyn StorageClient) -> Self {
        Self {
            id: details.recipe.id,
            tags: details.tags.into_iter().map(Into::into).collect(),
            author: UserResponse::from_user(&details.author, details.author_is_subscribed),
            ingredients: details
                .ingredients
                .into_iter()
                .map(|row| RecipeIngredientResponse {
                    id: row.ingredient_id,
                    name: row.name,
                    measurement_unit: row.measurement_unit,
                    amount: row.amount,
                })
                .collect(),
            is_favorited: details.is_favorited,
            is_in_shopping_cart: details.is_in_shopping_cart,
            name: details.recipe.name,
            image: storage.object_url(&details.recipe.image_key),
            text: details.recipe.text,
            cooking_time: details.recipe.cooking_time,
        }
    }
}

/// Short recipe representation used by membership toggles and the
/// subscription listing.
#[derive(Debug, Serialize)]
pub struct RecipeShortResponse {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortResponse {
    pub fn from_row(row: &RecipeShortRow, storage: &dyn StorageClient) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            image: storage.object_url(&row.image_key),
            cooking_time: row.cooking_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngredientAmount {
    pub id: i64,
    pub amount: i32,
}

/// Write representation of a recipe: flat tag/ingredient id lists plus a
/// base64 image. `image` may be omitted on update to keep the stored one.
#[derive(Debug, Deserialize)]
pub struct RecipeRequest {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<i64>,
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.is_empty() || self.name.len() > NAME_MAX_LENGTH {
            return Err(ApiError::field("name", "this field may not be blank"));
        }
        if self.text.is_empty() {
            return Err(ApiError::field("text", "this field may not be blank"));
        }
        if self.cooking_time < 1 {
            return Err(ApiError::field(
                "cooking_time",
                "cooking time must be at least 1",
            ));
        }
        if self.tags.is_empty() {
            return Err(ApiError::field("tags", "this list may not be empty"));
        }
        if self.ingredients.is_empty() {
            return Err(ApiError::field("ingredients", "this list may not be empty"));
        }
        let distinct: HashSet<i64> = self.ingredients.iter().map(|i| i.id).collect();
        if distinct.len() != self.ingredients.len() {
            return Err(ApiError::field(
                "ingredients",
                "ingredients must be unique",
            ));
        }
        if self.ingredients.iter().any(|i| i.amount < 1) {
            return Err(ApiError::field("amount", "amount must be at least 1"));
        }
        Ok(())
    }

    pub fn to_input(&self) -> RecipeInput {
        RecipeInput {
            name: self.name.clone(),
            text: self.text.clone(),
            cooking_time: self.cooking_time,
            tags: self.tags.clone(),
            ingredients: self.ingredients.iter().map(|i| (i.id, i.amount)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RecipeRequest {
        RecipeRequest {
            ingredients: vec![
                IngredientAmount { id: 1, amount: 200 },
                IngredientAmount { id: 2, amount: 3 },
            ],
            tags: vec![1],
            image: Some("data:image/png;base64,aGk=".into()),
            name: "Pancakes".into(),
            text: "Mix and fry.".into(),
            cooking_time: 15,
        }
    }

    #[test]
    fn accepts_a_well_formed_recipe() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_ingredient_ids() {
        let mut req = request();
        req.ingredients = vec![
            IngredientAmount { id: 1, amount: 200 },
            IngredientAmount { id: 1, amount: 300 },
        ];
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ApiError::Field("ingredients", _)));
    }

    #[test]
    fn rejects_zero_cooking_time_but_accepts_one() {
        let mut req = request();
        req.cooking_time = 0;
        assert!(matches!(
            req.validate().unwrap_err(),
            ApiError::Field("cooking_time", _)
        ));
        req.cooking_time = 1;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_zero_amount() {
        let mut req = request();
        req.ingredients[0].amount = 0;
        assert!(matches!(
            req.validate().unwrap_err(),
            ApiError::Field("amount", _)
        ));
    }

    #[test]
    fn rejects_empty_tag_and_ingredient_lists() {
        let mut req = request();
        req.tags.clear();
        assert!(matches!(
            req.validate().unwrap_err(),
            ApiError::Field("tags", _)
        ));

        let mut req = request();
        req.ingredients.clear();
        assert!(matches!(
            req.validate().unwrap_err(),
            ApiError::Field("ingredients", _)
        ));
    }

    #[test]
    fn to_input_flattens_ingredient_pairs() {
        let input = request().to_input();
        assert_eq!(input.ingredients, vec![(1, 200), (2, 3)]);
        assert_eq!(input.tags, vec![1]);
    }
}
