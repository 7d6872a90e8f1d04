//! REST API module for operational endpoints
//!
//! Provides liveness and Prometheus metrics over HTTP.

mod handlers;
mod server;

pub use handlers::HealthResponse;
pub use server::{router, run_server};
