//! HTTP API server for external control
//!
//! This module provides a REST API for driving the live session:
//! - POST /session/start - Acquire devices and connect
//! - POST /session/stop - Tear the session down
//! - GET /session/status - Connection status, counters and last error
//! - GET /session/transcript - Transcript accumulated so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, SessionResponse, StatusResponse};
pub use routes::create_router;
pub use state::AppState;
