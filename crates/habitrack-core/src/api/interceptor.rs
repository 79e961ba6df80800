use reqwest::header::{HeaderValue, AUTHORIZATION};
use tracing::warn;

use super::ApiRequest;
use crate::auth::Credentials;

/// Decorate `request` with `Authorization: Bearer <access>` when it wants
/// authentication and a token is available; otherwise return it unchanged.
pub fn authorize(request: &ApiRequest, credentials: &Credentials) -> ApiRequest {
    let token = match (&credentials.access_token, request.requires_auth()) {
        (Some(token), true) => token,
        _ => return request.clone(),
    };

    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.clone().with_header(AUTHORIZATION, value)
        }
        Err(_) => {
            warn!(path = request.path(), "Stored access token is not a valid header value");
            request.clone()
        }
    }
}
