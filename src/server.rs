//! Rosetta HTTP surface. Every route is a JSON POST; failures are returned
//! as a Rosetta error object with status 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, extract::State, routing::post};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::service::models::{
    AccountBalanceRequest, BlockRequest, BlockTransactionRequest, ConstructionCombineRequest,
    ConstructionDeriveRequest, ConstructionMetadataRequest, ConstructionParseRequest,
    ConstructionPayloadsRequest, ConstructionPreprocessRequest, ConstructionSignedRequest,
    MempoolTransactionRequest, MetadataRequest, NetworkRequest,
};
use crate::service::{ApiError, ErrorKind, IndexerService};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<IndexerService>,
    pub timeout: Duration,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/network/list", post(network_list_handler))
        .route("/network/status", post(network_status_handler))
        .route("/network/options", post(network_options_handler))
        .route("/block", post(block_handler))
        .route("/block/transaction", post(block_transaction_handler))
        .route("/mempool", post(mempool_handler))
        .route("/mempool/transaction", post(mempool_transaction_handler))
        .route("/account/balance", post(account_balance_handler))
        .route("/construction/derive", post(construction_derive_handler))
        .route("/construction/preprocess", post(construction_preprocess_handler))
        .route("/construction/metadata", post(construction_metadata_handler))
        .route("/construction/payloads", post(construction_payloads_handler))
        .route("/construction/combine", post(construction_combine_handler))
        .route("/construction/parse", post(construction_parse_handler))
        .route("/construction/hash", post(construction_hash_handler))
        .route("/construction/submit", post(construction_submit_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn run(
    addr: SocketAddr,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "rosetta api listening");
    axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Run a service call on the blocking pool, bounded by the request timeout.
async fn call<T, F>(state: &ApiState, f: F) -> Result<Json<T>, ApiError>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&IndexerService) -> Result<T, ApiError> + Send + 'static,
{
    let service = state.service.clone();
    let task = tokio::task::spawn_blocking(move || f(&service));
    match tokio::time::timeout(state.timeout, task).await {
        Ok(Ok(res)) => res.map(Json),
        Ok(Err(e)) => {
            warn!(error = %e, "request task failed");
            Err(ErrorKind::Database.with(e))
        }
        Err(_) => Err(ErrorKind::RequestTimeout.err()),
    }
}

async fn network_list_handler(
    State(state): State<ApiState>,
    Json(req): Json<MetadataRequest>,
) -> Response {
    call(&state, move |svc| Ok(svc.network_list(&req))).await.into_response()
}

async fn network_status_handler(
    State(state): State<ApiState>,
    Json(req): Json<NetworkRequest>,
) -> Response {
    call(&state, move |svc| svc.network_status(&req)).await.into_response()
}

async fn network_options_handler(
    State(state): State<ApiState>,
    Json(req): Json<NetworkRequest>,
) -> Response {
    call(&state, move |svc| svc.network_options(&req)).await.into_response()
}

async fn block_handler(State(state): State<ApiState>, Json(req): Json<BlockRequest>) -> Response {
    call(&state, move |svc| svc.block(&req)).await.into_response()
}

async fn block_transaction_handler(
    State(state): State<ApiState>,
    Json(req): Json<BlockTransactionRequest>,
) -> Response {
    call(&state, move |svc| svc.block_transaction(&req)).await.into_response()
}

async fn mempool_handler(
    State(state): State<ApiState>,
    Json(req): Json<NetworkRequest>,
) -> Response {
    call(&state, move |svc| svc.mempool(&req)).await.into_response()
}

async fn mempool_transaction_handler(
    State(state): State<ApiState>,
    Json(req): Json<MempoolTransactionRequest>,
) -> Response {
    call(&state, move |svc| svc.mempool_transaction(&req)).await.into_response()
}

async fn account_balance_handler(
    State(state): State<ApiState>,
    Json(req): Json<AccountBalanceRequest>,
) -> Response {
    call(&state, move |svc| svc.account_balance(&req)).await.into_response()
}

async fn construction_derive_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionDeriveRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_derive(&req)).await.into_response()
}

async fn construction_preprocess_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionPreprocessRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_preprocess(&req)).await.into_response()
}

async fn construction_metadata_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionMetadataRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_metadata(&req)).await.into_response()
}

async fn construction_payloads_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionPayloadsRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_payloads(&req)).await.into_response()
}

async fn construction_combine_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionCombineRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_combine(&req)).await.into_response()
}

async fn construction_parse_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionParseRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_parse(&req)).await.into_response()
}

async fn construction_hash_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionSignedRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_hash(&req)).await.into_response()
}

async fn construction_submit_handler(
    State(state): State<ApiState>,
    Json(req): Json<ConstructionSignedRequest>,
) -> Response {
    call(&state, move |svc| svc.construction_submit(&req)).await.into_response()
}
