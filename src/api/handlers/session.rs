//! Session introspection for hydrating clients.

use crate::api::route_access::AccessState;
use crate::auth::session::SessionCell;
use crate::auth::types::SessionResponse;
use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

const UNKEYED_REQUEST: &str = "unkeyed";

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    State(state): State<AccessState>,
    cell: Option<Extension<Arc<SessionCell>>>,
    headers: HeaderMap,
) -> Response {
    // the gate layer put a cell in the request extensions; when this handler
    // is mounted standalone, fall back to the identity-keyed registry
    let resolved = match cell {
        Some(Extension(cell)) => cell.load(state.backend.as_ref(), &headers).await,
        None => {
            let scoped = state.registry.scoped(request_id(&headers));
            scoped.load(state.backend.as_ref(), &headers).await
        }
    };

    match resolved {
        Some(app) => (StatusCode::OK, Json(SessionResponse::from(app))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(UNKEYED_REQUEST)
}
