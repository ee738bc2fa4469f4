use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo::User;
use crate::error::ApiError;
use crate::recipes::dto::RecipeShortResponse;

const EMAIL_MAX_LENGTH: usize = 254;
const CHAR_FIELD_MAX_LENGTH: usize = 150;
const PASSWORD_MIN_LENGTH: usize = 8;

/// Usernames that collide with API routes.
const RESERVED_USERNAMES: &[&str] = &["me"];

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserResponse {
    pub fn from_user(user: &User, is_subscribed: bool) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        validate_username(&self.username)?;
        validate_name("first_name", &self.first_name)?;
        validate_name("last_name", &self.last_name)?;
        validate_password(&self.password)?;
        Ok(())
    }
}

/// Registration response; no `is_subscribed` here, the requester has
/// just been created.
#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for CreatedUserResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: String,
    pub current_password: String,
}

/// Subscribed-to user with an embedded, optionally capped recipe list.
#[derive(Debug, Serialize)]
pub struct SubscriptionUserResponse {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeShortResponse>,
    pub recipes_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub recipes_limit: Option<i64>,
    #[serde(default = "crate::pagination::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub recipes_limit: Option<i64>,
}

pub fn validate_email(value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.len() > EMAIL_MAX_LENGTH || !EMAIL_RE.is_match(value) {
        return Err(ApiError::field("email", "enter a valid email address"));
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<(), ApiError> {
    if RESERVED_USERNAMES.contains(&value) {
        return Err(ApiError::field(
            "username",
            format!("'{value}' is a reserved username"),
        ));
    }
    if value.is_empty() || value.len() > CHAR_FIELD_MAX_LENGTH || !USERNAME_RE.is_match(value) {
        return Err(ApiError::field(
            "username",
            "username may contain only letters, digits and @/./+/-/_ characters",
        ));
    }
    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() || value.len() > CHAR_FIELD_MAX_LENGTH {
        return Err(ApiError::field(field, "this field may not be blank"));
    }
    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), ApiError> {
    if value.len() < PASSWORD_MIN_LENGTH {
        return Err(ApiError::field(
            "password",
            format!("password must be at least {PASSWORD_MIN_LENGTH} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateUserRequest {
        CreateUserRequest {
            email: "cook@example.com".into(),
            username: "head.cook".into(),
            first_name: "Terry".into(),
            last_name: "Cook".into(),
            password: "long-enough".into(),
        }
    }

    #[test]
    fn accepts_a_well_formed_registration() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_reserved_username() {
        let mut req = request();
        req.username = "me".into();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ApiError::Field("username", _)));
    }

    #[test]
    fn rejects_username_with_forbidden_characters() {
        assert!(validate_username("has spaces").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username("ok.name+tag@host-1_x").is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.c").is_ok());
    }

    #[test]
    fn rejects_short_password() {
        let mut req = request();
        req.password = "short".into();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ApiError::Field("password", _)));
    }

    #[test]
    fn rejects_blank_names() {
        let mut req = request();
        req.first_name = String::new();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ApiError::Field("first_name", _)));
    }
}
