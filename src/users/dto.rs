use serde::{Deserialize, Serialize};

use crate::users::{
    profiles::UserType,
    repo_types::{Region, User},
};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub region: Option<Region>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

/// Body for endpoints that only need an address (resend, reset request).
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub user: User,
    pub already_activated: bool,
}

/// A user together with the profile variants it has been promoted to.
#[derive(Debug, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    pub user_types: Vec<UserType>,
}

#[derive(Debug, Serialize)]
pub struct RegionChoice {
    pub value: i16,
    pub label: &'static str,
}

impl From<Region> for RegionChoice {
    fn from(r: Region) -> Self {
        Self {
            value: r.code(),
            label: r.label(),
        }
    }
}
