//! Session auth for the admin-only HTTP surface (spec §4.G, §6): a request
//! with no valid session cookie is treated as an unauthenticated viewer
//! (read-only); `POST /login` against the configured admin credentials
//! hands back a cookie-backed admin session. Sessions live only in this
//! process's memory and are invalidated on restart, same as every other
//! piece of BASim state (spec §1, "Persistence: ... in-memory").

use std::collections::HashMap;
use std::sync::RwLock;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::api::ApiState;
use crate::error::BasimError;

pub const SESSION_COOKIE: &str = "basim_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

/// In-memory token → role map. The only role ever issued is `Admin` (by
/// `/login`); there is no session for `Viewer`, it's simply the default
/// for any request without a valid cookie.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Role>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    pub fn issue_admin(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.write().unwrap().insert(token.clone(), Role::Admin);
        token
    }

    pub fn role_of(&self, token: &str) -> Option<Role> {
        self.sessions.read().unwrap().get(token).copied()
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.write().unwrap().remove(token);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor that fails with `401` unless the request carries a cookie
/// naming a live admin session. Every admin-prefixed and override-mutating
/// handler takes this instead of a plain `State<ApiState>`.
pub struct RequireAdmin;

impl FromRequestParts<ApiState> for RequireAdmin {
    type Rejection = BasimError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        match token.and_then(|t| state.sessions.role_of(&t)) {
            Some(Role::Admin) => Ok(RequireAdmin),
            _ => Err(BasimError::NotAuthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_resolves_to_admin_until_revoked() {
        let store = SessionStore::new();
        let token = store.issue_admin();
        assert_eq!(store.role_of(&token), Some(Role::Admin));
        store.revoke(&token);
        assert_eq!(store.role_of(&token), None);
    }

    #[test]
    fn unknown_token_has_no_role() {
        let store = SessionStore::new();
        assert_eq!(store.role_of("nope"), None);
    }
}
