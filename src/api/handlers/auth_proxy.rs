//! Catch-all passthrough to the wrapped auth backend.
//!
//! Sign-in, sign-up, and sign-out land here; the backend's `set-cookie`
//! headers are relayed verbatim so browser sessions actually stick.

use crate::api::route_access::AccessState;
use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

pub async fn forward(
    State(state): State<AccessState>,
    Path(rest): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut target = rest;
    if let Some(query) = query {
        target.push('?');
        target.push_str(&query);
    }

    match state.backend.forward(method, &target, &headers, body).await {
        Ok(forwarded) => {
            let mut response = Response::new(Body::from(forwarded.body));
            *response.status_mut() = forwarded.status;
            for (name, value) in &forwarded.headers {
                response.headers_mut().append(name, value.clone());
            }
            response
        }
        Err(err) => {
            error!("Auth passthrough failed: {err}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Auth backend unreachable" })),
            )
                .into_response()
        }
    }
}
