//! Request correlation for the sync API.
//!
//! Every request gets an id: the caller's `x-request-id` when it is short
//! and printable, otherwise a fresh UUID v4. The id and the acting staff
//! member from `x-actor-id` are recorded on the `http_request` span and the
//! Sentry scope, so a sweep's log lines can be traced back to the platform
//! request that triggered it. The id is echoed in the response headers.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Span;
use uuid::Uuid;

use super::auth::ACTOR_ID_HEADER;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 64;

/// The caller's request id if it is safe to log, otherwise a new one.
fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_REQUEST_ID_LEN
                && id.chars().all(|c| c.is_ascii_graphic())
        })
        .map_or_else(|| Uuid::new_v4().to_string(), String::from)
}

/// Middleware that tags every request with a request id and its actor.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_of(request.headers());
    let actor_id = request
        .headers()
        .get(ACTOR_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|id| id.trim().parse::<i32>().ok());

    let span = Span::current();
    span.record("request_id", &request_id);
    if let Some(actor_id) = actor_id {
        span.record("actor_id", actor_id);
    }

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
        if let Some(actor_id) = actor_id {
            scope.set_tag("actor_id", actor_id);
        }
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).expect("header"));
        headers
    }

    #[test]
    fn test_caller_request_id_is_kept() {
        assert_eq!(request_id_of(&headers_with("req-42")), "req-42");
    }

    #[test]
    fn test_unusable_request_id_is_replaced() {
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        for id in [long.as_str(), "two words", ""] {
            let assigned = request_id_of(&headers_with(id));
            assert_ne!(assigned, id);
            assert!(Uuid::parse_str(&assigned).is_ok());
        }
        assert!(Uuid::parse_str(&request_id_of(&HeaderMap::new())).is_ok());
    }
}
