//! HTTP API Server
//!
//! REST routes for products, orders and carts, a generic `/rpc` ingress,
//! and status/health endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::dispatch::{dispatch, Command, OrderRequest, Reply};
use crate::config::{ApiConfig, ReplicationMode};
use crate::coordinator::{CoordinatorStatus, PrimaryCoordinator};
use crate::error::{Error, Result};
use crate::store::{ProductDraft, ProductFilter, ProductPatch};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// Write path and reads
    pub coordinator: Arc<PrimaryCoordinator>,
    /// Process start, for uptime
    pub started_at: Instant,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node_id: String, coordinator: Arc<PrimaryCoordinator>) -> Self {
        let state = Arc::new(AppState {
            node_id,
            coordinator,
            started_at: Instant::now(),
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Build the router with middleware applied
    pub fn router(&self) -> Router {
        let router = Self::create_router(Arc::clone(&self.state)).layer(TraceLayer::new_for_http());
        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Create the router
    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            // Products
            .route("/products", get(handle_list_products).post(handle_create_product))
            .route(
                "/products/:id",
                get(handle_get_product)
                    .put(handle_update_product)
                    .delete(handle_delete_product),
            )
            // Orders
            .route("/orders", post(handle_create_order))
            .route("/orders/:user_id", get(handle_user_orders))
            // Carts
            .route("/cart/:user_id", get(handle_get_cart).post(handle_add_to_cart))
            .route("/cart/:user_id/item/:product_id", delete(handle_remove_from_cart))
            // Generic ingress
            .route("/rpc", post(handle_rpc))
            // Status and info
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .with_state(state)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Cart addition body
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: u64,
    pub quantity: u32,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub replication: CoordinatorStatus,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
    pub mode: ReplicationMode,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error: a crate error rendered as `{error, code}`
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            Error::Replication { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "REPLICATION_FAILED"),
            Error::Snapshot { .. } | Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if !self.0.is_client_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

fn reply_response(reply: Reply) -> Response {
    let status = if reply.created { StatusCode::CREATED } else { StatusCode::OK };
    (status, Json(reply.body)).into_response()
}

async fn run(state: &AppState, command: Command) -> ApiResult {
    Ok(reply_response(dispatch(&state.coordinator, command).await?))
}

// ============ Handlers ============

async fn handle_list_products(
    State(state): State<Arc<AppState>>,
    filter: std::result::Result<Query<ProductFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    run(&state, Command::ListProducts(filter)).await
}

async fn handle_create_product(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult {
    let Json(draft) = payload?;
    run(&state, Command::CreateProduct(draft)).await
}

async fn handle_get_product(
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    run(&state, Command::GetProduct { id }).await
}

async fn handle_update_product(
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<u64>, PathRejection>,
    payload: std::result::Result<Json<ProductPatch>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let Json(patch) = payload?;
    run(&state, Command::UpdateProduct { id, patch }).await
}

async fn handle_delete_product(
    State(state): State<Arc<AppState>>,
    id: std::result::Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    run(&state, Command::DeleteProduct { id }).await
}

async fn handle_create_order(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    run(&state, Command::CreateOrder(request)).await
}

async fn handle_user_orders(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult {
    run(&state, Command::OrdersForUser { user_id }).await
}

async fn handle_get_cart(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult {
    run(&state, Command::Cart { user_id }).await
}

async fn handle_add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: std::result::Result<Json<AddToCartRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    run(
        &state,
        Command::AddToCart {
            user_id,
            product_id: req.product_id,
            quantity: req.quantity,
        },
    )
    .await
}

async fn handle_remove_from_cart(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Path<(String, u64)>, PathRejection>,
) -> ApiResult {
    let Path((user_id, product_id)) = params?;
    run(&state, Command::RemoveFromCart { user_id, product_id }).await
}

async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<Command>, JsonRejection>,
) -> ApiResult {
    let Json(command) = payload?;
    tracing::debug!("RPC {:?}", command);
    run(&state, command).await
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        replication: state.coordinator.status().await,
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
        mode: state.coordinator.mode(),
    })
}
