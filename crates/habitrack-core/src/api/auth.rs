//! Authentication endpoints of the resource server.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiRequest;
use crate::models::UserProfile;

pub const SIGNUP_PATH: &str = "/auth/signup/";
pub const LOGIN_PATH: &str = "/auth/login/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const PROFILE_PATH: &str = "/auth/profile/";
pub const REFRESH_PATH: &str = "/auth/refresh/";

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// New-account form. `password_confirmation` is checked by the server.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "password2")]
    pub password_confirmation: String,
}

pub fn login_request(username: &str, password: &str) -> ApiRequest {
    ApiRequest::post(LOGIN_PATH)
        .json(&json!({ "username": username, "password": password }))
        .anonymous()
}

pub fn signup_request(registration: &Registration) -> ApiRequest {
    ApiRequest::post(SIGNUP_PATH).json(registration).anonymous()
}

pub fn refresh_request(refresh: &str) -> ApiRequest {
    ApiRequest::post(REFRESH_PATH)
        .json(&json!({ "refresh": refresh }))
        .anonymous()
}

/// Logout is itself an authenticated call: the server only blacklists the
/// refresh token for the user it belongs to.
pub fn logout_request(refresh: &str) -> ApiRequest {
    ApiRequest::post(LOGOUT_PATH).json(&json!({ "refresh": refresh }))
}

pub fn profile_request() -> ApiRequest {
    ApiRequest::get(PROFILE_PATH)
}
