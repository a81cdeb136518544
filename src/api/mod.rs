//! HTTP API Module
//!
//! Provides the REST API for catalog operations and replication status.

pub mod dispatch;
mod http;

pub use dispatch::{dispatch, Command, Reply};
pub use http::{AppState, ErrorResponse, HttpServer};
