//! Request-scoped extractors and layers.
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rollgate_workflow::Actor;
use std::convert::Infallible;
use tower_http::cors::CorsLayer;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// The caller, read from `X-Actor-*` headers. Falls back to the system
/// actor when no id is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut actor = match header(ACTOR_ID_HEADER) {
            Some(id) => Actor::user(id),
            None => Actor::system(),
        };
        actor.email = header(ACTOR_EMAIL_HEADER);
        actor.name = header(ACTOR_NAME_HEADER);
        Ok(RequestActor(actor))
    }
}
