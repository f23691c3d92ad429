//! HTTP binding for the policy store.
//!
//! `GET /policy/version` is the cheap probe pollers use to decide whether
//! `GET /policy` needs to be fetched again. Caller identity arrives in the
//! `x-actor-id` / `x-actor-role` headers set by the fronting auth layer.

use crate::core::{Actor, Policy, PolicyError, Role, VersionInfo};
use crate::policy::{PolicyStore, policy_hash};
use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub message: String,
    pub version: u64,
    pub hash: String,
}

#[derive(Debug)]
pub enum WebError {
    Policy(PolicyError),
    Unauthorized(String),
    Forbidden(String),
}

impl From<PolicyError> for WebError {
    fn from(err: PolicyError) -> Self {
        WebError::Policy(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Policy(err) => (
                StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                err.to_string(),
                err.kind().to_string(),
            ),
            WebError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, msg, "unauthorized".to_string())
            }
            WebError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "forbidden".to_string()),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

/// Authenticated caller, extracted from request headers.
pub struct AuthenticatedActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| WebError::Unauthorized("No actor provided".to_string()))?;
        let role = header(parts, ACTOR_ROLE_HEADER)
            .and_then(Role::parse)
            .ok_or_else(|| WebError::Unauthorized("Invalid actor role".to_string()))?;

        Ok(AuthenticatedActor(Actor::new(id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn router(store: Arc<PolicyStore>) -> Router {
    Router::new()
        .route("/policy", get(get_policy).put(update_policy))
        .route("/policy/version", get(get_policy_version))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn get_policy(
    State(store): State<Arc<PolicyStore>>,
    AuthenticatedActor(_actor): AuthenticatedActor,
) -> Json<Policy> {
    Json(store.get_policy().await)
}

async fn get_policy_version(
    State(store): State<Arc<PolicyStore>>,
    AuthenticatedActor(_actor): AuthenticatedActor,
) -> Json<VersionInfo> {
    Json(store.get_policy_version().await)
}

async fn update_policy(
    State(store): State<Arc<PolicyStore>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(document): Json<Value>,
) -> Result<Json<UpdateResponse>, WebError> {
    if !actor.is_admin() {
        return Err(WebError::Forbidden(
            "Admin role required to update the policy".to_string(),
        ));
    }

    let policy = store.update_policy_document(&actor, document).await?;
    let hash = policy_hash(&policy.rules)?;

    Ok(Json(UpdateResponse {
        message: "Policy updated successfully".to_string(),
        version: policy.version,
        hash,
    }))
}
