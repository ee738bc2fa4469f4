use serde::Deserialize;
use uuid::Uuid;

use super::repo::RecipeListFilter;
use crate::error::ApiError;

/// Query parameters of the recipe listing. `tags` may repeat
/// (`?tags=breakfast&tags=dinner`) with OR semantics; the membership
/// flags accept `1/0/true/false`.
#[derive(Debug, Deserialize)]
pub struct RecipeListQuery {
    pub author: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
    #[serde(default = "crate::pagination::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl RecipeListQuery {
    pub fn filter(&self) -> Result<RecipeListFilter, ApiError> {
        Ok(RecipeListFilter {
            author: self.author,
            tags: self.tags.clone(),
            is_favorited: parse_flag("is_favorited", self.is_favorited.as_deref())?,
            is_in_shopping_cart: parse_flag(
                "is_in_shopping_cart",
                self.is_in_shopping_cart.as_deref(),
            )?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IngredientListQuery {
    /// Case-sensitive name prefix.
    pub name: Option<String>,
}

fn parse_flag(field: &'static str, value: Option<&str>) -> Result<Option<bool>, ApiError> {
    match value {
        None => Ok(None),
        Some("1") | Some("true") | Some("True") => Ok(Some(true)),
        Some("0") | Some("false") | Some("False") => Ok(Some(false)),
        Some(other) => Err(ApiError::field(
            field,
            format!("invalid boolean value '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_numeric_and_literal_booleans() {
        assert_eq!(parse_flag("f", Some("1")).unwrap(), Some(true));
        assert_eq!(parse_flag("f", Some("true")).unwrap(), Some(true));
        assert_eq!(parse_flag("f", Some("0")).unwrap(), Some(false));
        assert_eq!(parse_flag("f", Some("False")).unwrap(), Some(false));
        assert_eq!(parse_flag("f", None).unwrap(), None);
    }

    #[test]
    fn parse_flag_rejects_garbage() {
        let err = parse_flag("is_favorited", Some("yes")).unwrap_err();
        assert!(matches!(err, ApiError::Field("is_favorited", _)));
    }

    #[test]
    fn filter_carries_tags_and_author() {
        let query = RecipeListQuery {
            author: None,
            tags: vec!["breakfast".into(), "dinner".into()],
            is_favorited: Some("1".into()),
            is_in_shopping_cart: None,
            limit: 20,
            offset: 0,
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.tags, vec!["breakfast", "dinner"]);
        assert_eq!(filter.is_favorited, Some(true));
        assert_eq!(filter.is_in_shopping_cart, None);
    }

    #[test]
    fn missing_params_deserialize_to_defaults() {
        let query: RecipeListQuery = serde_json::from_str("{}").unwrap();
        assert!(query.tags.is_empty());
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 0);
    }
}
