//! Caller authentication for the sync API.
//!
//! The API sits behind the platform front-end. The front-end authenticates
//! with a shared bearer token and names the signed-in staff member in the
//! `x-actor-id` and `x-actor-role` headers.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use dispatch_sync_core::{StaffRole, UserId};

use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;
use crate::sync::Actor;

/// Header carrying the acting user's id.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the acting user's role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Compare two byte strings without short-circuiting on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Reject requests without the configured bearer token.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the token is missing or wrong.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    if !constant_time_eq(
        presented.as_bytes(),
        state.api_token().expose_secret().as_bytes(),
    ) {
        return Err(AppError::Unauthorized("invalid bearer token".to_string()));
    }

    Ok(next.run(request).await)
}

/// Extractor for the staff member a request acts for.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentActor(actor): CurrentActor) -> String {
///     format!("acting as {}", actor.id)
/// }
/// ```
pub struct CurrentActor(pub Actor);

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id: UserId = header_str(parts, ACTOR_ID_HEADER)?
            .parse()
            .map_err(|_| AppError::BadRequest(format!("invalid {ACTOR_ID_HEADER} header")))?;
        let role: StaffRole = header_str(parts, ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(AppError::BadRequest)?;

        set_sentry_user(id.as_i32(), &role.to_string());
        Ok(Self(Actor::new(id, role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret-token", b"secret-token"));
        assert!(!constant_time_eq(b"secret-token", b"secret-tokem"));
        assert!(!constant_time_eq(b"secret", b"secret-token"));
    }
}
