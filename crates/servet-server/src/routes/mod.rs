//! API routes.

pub mod health;
pub mod openapi;
pub mod query;
pub mod sessions;

pub use health::{HealthResponse, health_routes};
pub use openapi::{ApiDoc, openapi_handler};
pub use query::{InspectQueryRequest, inspect_query_handler};
pub use sessions::{
    SessionResponse, create_session_handler, delete_session_handler, get_session_handler,
};
