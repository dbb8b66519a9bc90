//! Request identity: session cookie or bearer token.

use super::response::ApiError;
use crate::auth::Identity;
use crate::service::TaskManager;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

pub const SESSION_COOKIE: &str = "session";

/// Session token sent with a request. A bearer token wins over the cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a new session.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// The caller of the current request. Anonymous when no live session is sent.
pub struct CurrentIdentity(pub Identity);

impl FromRequestParts<TaskManager> for CurrentIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &TaskManager) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        let identity = state.identify(token.as_deref())?;
        Ok(CurrentIdentity(identity))
    }
}
