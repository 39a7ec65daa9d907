//! OpenAPI documentation configuration.

use axum::Json;
use utoipa::OpenApi;

use super::{health, query, sessions};
use crate::inspector::{QueryDetails, QueryEnvelope};

/// OpenAPI documentation for the Servet API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Servet API",
        description = "Session lifecycle and abuse-control service",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Local server"),
    ),
    paths(
        // Health
        health::health,
        // Sessions
        sessions::create_session_handler,
        sessions::get_session_handler,
        sessions::delete_session_handler,
        // Query
        query::inspect_query_handler,
    ),
    components(
        schemas(
            health::HealthResponse,
            sessions::SessionResponse,
            query::InspectQueryRequest,
            QueryEnvelope,
            QueryDetails,
        )
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "sessions", description = "Per-client encrypted sessions"),
        (name = "query", description = "SQL denylist inspection"),
    )
)]
pub struct ApiDoc;

/// GET /api/v1/openapi.json - The OpenAPI document.
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
