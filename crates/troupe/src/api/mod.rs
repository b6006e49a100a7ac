//! HTTP API: router, shared state, handlers, and error responses.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use handlers::{HealthResponse, StatusResponse};
pub use routes::create_router;
pub use state::AppState;
