//! Discovery Registry
//!
//! A tiny HTTP service that tells clients which catalog server to use.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};

/// Answer to `GET /getServer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLocation {
    pub code: u16,
    pub server: String,
}

pub struct Registry {
    bind_address: String,
    advertise_address: Arc<String>,
}

impl Registry {
    pub fn new(bind_address: impl Into<String>, advertise_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            advertise_address: Arc::new(advertise_address.into()),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.bind_address.clone(), config.advertise_address.clone())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/getServer", get(handle_get_server))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.advertise_address))
    }

    /// Serve until the listener fails
    pub async fn serve(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "Discovery registry listening on {} (advertising {})",
            self.bind_address,
            self.advertise_address
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("Registry server error: {}", e)))
    }
}

async fn handle_get_server(State(server): State<Arc<String>>) -> Json<ServerLocation> {
    Json(ServerLocation {
        code: 200,
        server: server.as_str().to_string(),
    })
}
