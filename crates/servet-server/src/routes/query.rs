//! Query inspection endpoint.

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::inspector::{QueryEnvelope, guard_query};

/// Request to run a query string through the denylist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InspectQueryRequest {
    /// Raw SQL text.
    pub sql: String,
    /// Accept denylisted queries anyway.
    #[serde(default)]
    pub disable_protection: bool,
}

/// POST /api/v1/query/inspect - Check a query against the denylist.
#[utoipa::path(
    post,
    path = "/api/v1/query/inspect",
    request_body = InspectQueryRequest,
    responses(
        (status = 200, description = "Inspection result", body = QueryEnvelope),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "query"
)]
pub async fn inspect_query_handler(
    Json(request): Json<InspectQueryRequest>,
) -> Json<QueryEnvelope> {
    let envelope = guard_query(&request.sql, request.disable_protection);
    if !envelope.success {
        tracing::debug!(details = ?envelope.details, "Query rejected by denylist");
    }
    Json(envelope)
}
