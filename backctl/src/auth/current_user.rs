//! Extracting the authenticated principal from request parts.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
};

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Cookie header present but unreadable
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.cookie_name;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(user) => return Some(Ok(user)),
                Err(_) => {
                    // Invalid/expired token; expected for stale cookies, so
                    // don't propagate the verification error
                    continue;
                }
            }
        }
    }
    None
}

/// Optional variant of the extractor: `None` for anonymous requests instead
/// of a 401. Used where anonymous access is legitimate (the navigation gate,
/// public pages).
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_jwt_session_auth(parts, &state.config) {
            Some(Ok(user)) => Ok(MaybeUser(Some(user))),
            Some(Err(e)) => Err(e),
            None => Ok(MaybeUser(None)),
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_jwt_session_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found JWT session authenticated user: {}", user.id);
                Ok(user)
            }
            Some(Err(e)) => {
                trace!("JWT session authentication failed: {:?}", e);
                Err(Error::Unauthenticated { message: None })
            }
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            ..Default::default()
        }
    }

    fn test_user() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "testuser".to_string(),
            role_id: Uuid::new_v4(),
            role_title: "owner".to_string(),
            business_id: Uuid::new_v4(),
            branch_id: None,
            permissions: vec!["role:view".to_string()],
        }
    }

    fn parts_with_cookie(cookie: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(axum::http::header::COOKIE, cookie)
            .body(())
            .unwrap();
        let (parts, _body) = request.into_parts();
        parts
    }

    #[test]
    fn test_valid_session_cookie() {
        let config = test_config();
        let user = test_user();
        let token = session::create_session_token(&user, &config).unwrap();

        let parts = parts_with_cookie(&format!("{}={}", config.auth.cookie_name, token));
        let extracted = try_jwt_session_auth(&parts, &config).unwrap().unwrap();
        assert_eq!(extracted.id, user.id);
        assert_eq!(extracted.permissions, user.permissions);
    }

    #[test]
    fn test_missing_cookie_is_anonymous() {
        let config = test_config();
        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (parts, _body) = request.into_parts();
        assert!(try_jwt_session_auth(&parts, &config).is_none());
    }

    #[test]
    fn test_garbage_token_is_anonymous() {
        let config = test_config();
        let parts = parts_with_cookie(&format!("{}=not-a-jwt", config.auth.cookie_name));
        assert!(try_jwt_session_auth(&parts, &config).is_none());
    }

    #[test]
    fn test_other_cookies_ignored() {
        let config = test_config();
        let user = test_user();
        let token = session::create_session_token(&user, &config).unwrap();

        let parts = parts_with_cookie(&format!("theme=dark; {}={}; lang=en", config.auth.cookie_name, token));
        let extracted = try_jwt_session_auth(&parts, &config).unwrap().unwrap();
        assert_eq!(extracted.id, user.id);
    }
}
