use serde::{Deserialize, Serialize};

use crate::users::repo::User;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by signup and login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Allow-listed profile update fields. The handler checks the raw key set
/// against [`USER_UPDATE_FIELDS`] before deserializing into this.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub age: Option<i32>,
}

pub const USER_UPDATE_FIELDS: &[&str] = &["name", "email", "password", "age"];

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
