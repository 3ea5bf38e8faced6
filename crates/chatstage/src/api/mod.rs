//! HTTP API module.
//!
//! Provides the inbound message endpoint, the event stream, and read-only
//! views of the current layout and artifacts.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::{ServerOptions, create_router};
pub use state::AppState;
