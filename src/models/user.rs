// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique e-mail address.
    pub email: String,

    pub name: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new user (registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Value must be a valid e-mail address."))]
    pub email: String,
    #[validate(length(min = 5, max = 100, message = "Name is too short. Minimum 5 characters."))]
    pub name: String,
    #[validate(length(
        min = 5,
        max = 128,
        message = "Password is too short. Minimum 5 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Value must be a valid e-mail address."))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}
