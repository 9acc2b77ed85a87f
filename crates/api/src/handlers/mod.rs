//! HTTP and websocket handlers exposed by the API server.

pub mod alerts;
pub mod metrics;
