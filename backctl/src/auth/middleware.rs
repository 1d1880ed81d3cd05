//! Navigation gate middleware.
//!
//! Every request passes through the gate before reaching a handler. The route
//! table decides from the path and the session claims alone; no database trip
//! happens here. Handlers still call the action guard before mutating
//! anything, so a page reached through a stale table cannot act beyond its
//! permissions.
//!
//! Denials never reach the caller as errors: an anonymous visitor on a
//! protected path is sent to the sign-in page with the original path as the
//! return target, and an authenticated visitor lacking a required permission
//! is sent to the generic access-denied page. The missing codes show up in
//! logs only.

use axum::{
    extract::{FromRequestParts, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{trace, warn};

use crate::{
    AppState,
    auth::current_user::MaybeUser,
    auth::destinations,
    auth::routes::NavDecision,
    errors::Error,
};

/// Paths that must stay reachable without a session even under
/// `deny_unmatched`: the authentication surface itself, the pages the gate
/// redirects to, and liveness checks.
const PUBLIC_PREFIXES: &[&str] = &[
    "/authentication",
    "/verify-email",
    "/login",
    "/access-denied",
    "/health",
    "/api-docs",
];

fn is_public(path: &str) -> bool {
    PUBLIC_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

pub(crate) enum GateOutcome {
    Proceed(Request),
    Redirect(Redirect),
}

pub(crate) async fn navigation_gate(state: AppState, request: Request) -> Result<GateOutcome, Error> {
    let path = request.uri().path().to_string();

    // A signed-in visitor has no business on the sign-in page; everything
    // else on the public list passes without touching the session at all.
    let login_page = path == "/login" || path.starts_with("/login/");
    if is_public(&path) && !login_page {
        return Ok(GateOutcome::Proceed(request));
    }

    let (mut parts, body) = request.into_parts();
    let MaybeUser(user) = MaybeUser::from_request_parts(&mut parts, &state).await?;
    let request = Request::from_parts(parts, body);

    if login_page {
        return Ok(match &user {
            Some(user) => GateOutcome::Redirect(Redirect::to(&destinations::destination_for(user))),
            None => GateOutcome::Proceed(request),
        });
    }

    match state.routes.decide(&path, user.as_ref()) {
        NavDecision::Allow => {
            trace!(path, "navigation allowed");
            Ok(GateOutcome::Proceed(request))
        }
        NavDecision::RequiresLogin => {
            trace!(path, "navigation requires login");
            Ok(GateOutcome::Redirect(Redirect::to(&format!("/login?next={path}"))))
        }
        NavDecision::Denied { missing } => {
            warn!(path, missing = missing.join(","), "navigation denied");
            Ok(GateOutcome::Redirect(Redirect::to("/access-denied")))
        }
    }
}

/// Middleware wrapper around [`navigation_gate`].
pub async fn navigation_gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    match navigation_gate(state, request).await? {
        GateOutcome::Proceed(request) => Ok(next.run(request).await),
        GateOutcome::Redirect(redirect) => Ok(redirect.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_prefixes() {
        assert!(is_public("/authentication/login"));
        assert!(is_public("/authentication"));
        assert!(is_public("/verify-email"));
        assert!(is_public("/health"));
        assert!(is_public("/access-denied"));
        assert!(!is_public("/roles"));
        assert!(!is_public("/authenticationx"));
    }
}
