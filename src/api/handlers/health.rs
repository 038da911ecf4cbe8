use crate::api::route_access::AccessState;
use crate::GIT_COMMIT_HASH;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    backend: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Auth backend is reachable", body = Health),
        (status = 503, description = "Auth backend is unreachable", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(method: Method, state: State<AccessState>) -> impl IntoResponse {
    let backend = match state.backend.probe().await {
        Ok(()) => "ok",
        Err(err) => {
            error!("Failed to probe auth backend: {err}");
            "error"
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend.to_string(),
    };

    let status = if backend == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    if method == Method::GET {
        (status, Json(health)).into_response()
    } else {
        status.into_response()
    }
}
