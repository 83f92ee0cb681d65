//! REST API for ChainSign
//!
//! Mirrors the routes of the detection web app: record a detection, list the
//! chain, verify a block or the whole chain.

use axum::{
    extract::{Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

use crate::blockchain::{Block, RecordContext};
use crate::detection::{demo_detection, SignDetection};
use crate::error::ChainError;
use crate::ledger::{Ledger, LedgerStats};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<Ledger>,
    static_dir: Option<PathBuf>,
    api_stats: Arc<RwLock<ApiStats>>,
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    records_added: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

impl ApiState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            static_dir: None,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }

    /// Serve a static dashboard from `dir` for non-API paths.
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Ledger(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(e @ ChainError::InvalidRecord(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Ledger(e) if e.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            ApiError::Ledger(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Ledger(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub block_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Detection computed by the caller; a demo detection is used when absent.
    #[serde(default)]
    pub detection: Option<SignDetection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReceipt {
    pub block_id: String,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub image_hash: String,
}

impl From<&Block> for BlockReceipt {
    fn from(block: &Block) -> Self {
        BlockReceipt {
            block_id: block.id.clone(),
            hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
            timestamp: block.timestamp,
            image_hash: block.data.image_hash.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub detection: SignDetection,
    pub is_demo: bool,
    pub blockchain: BlockReceipt,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainListing {
    chain: Vec<Block>,
    total_blocks: usize,
    latest_block: Block,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainVerification {
    valid: bool,
    block_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    ledger: LedgerStats,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    records_added: u64,
    uptime_seconds: u64,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging and statistics middleware
async fn stats_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    state.api_stats.write().await.record_request(success);

    response
}

/// Logs method, path, status and duration of every API request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(state: ApiState) -> Router {
    // CORS configuration - allow all origins with credentials
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let static_dir = state.static_dir.clone();

    let api_routes = Router::new()
        .route("/blockchain", get(get_blockchain))
        .route("/detect", post(detect))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .with_state(state);

    let router = Router::new().nest("/api", api_routes);
    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.layer(cors)
}

/// Serve the API on `0.0.0.0:port` until `shutdown` resolves.
pub async fn run_api_server(
    state: ApiState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "durable": state.ledger.is_durable(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_blockchain(
    State(state): State<ApiState>,
    Query(query): Query<BlockchainQuery>,
) -> Result<Response, ApiError> {
    let ledger = &state.ledger;

    match (query.action.as_deref(), query.block_id.as_deref()) {
        (Some("verify"), Some(block_id)) => Ok(Json(ledger.verify_block_by_id(block_id)).into_response()),
        (Some("verify-chain"), _) => Ok(Json(ChainVerification {
            valid: ledger.verify_chain_integrity(),
            block_count: ledger.get_chain().len(),
        })
        .into_response()),
        (Some("verify-chain-strict"), _) => Ok(Json(ChainVerification {
            valid: ledger.verify_chain_strict(),
            block_count: ledger.get_chain().len(),
        })
        .into_response()),
        _ => {
            let mut chain = ledger.get_chain();
            let latest_block = chain.last().cloned().ok_or(ChainError::EmptyChain)?;
            // Genesis is not a user-facing record.
            chain.retain(|block| !block.is_genesis());
            Ok(Json(ChainListing {
                total_blocks: chain.len(),
                chain,
                latest_block,
            })
            .into_response())
        }
    }
}

async fn detect(
    State(state): State<ApiState>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    let image_data = request
        .image_data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("No image data provided".to_string()))?;

    let (detection, is_demo) = match request.detection {
        Some(detection) => (detection, false),
        None => (demo_detection(), true),
    };

    let context = RecordContext {
        location: request.location,
        device_id: request.device_id,
    };

    let block = state
        .ledger
        .add_record(image_data.as_bytes(), detection.to_record(), context)
        .await?;

    state.api_stats.write().await.records_added += 1;

    Ok(Json(DetectResponse {
        detection,
        is_demo,
        blockchain: BlockReceipt::from(&block),
    }))
}

async fn get_api_stats(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.api_stats.read().await;
    let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(StatsResponse {
        ledger: state.ledger.stats(),
        total_requests: stats.total_requests,
        successful_requests: stats.successful_requests,
        failed_requests: stats.failed_requests,
        records_added: stats.records_added,
        uptime_seconds: uptime,
    })
}
