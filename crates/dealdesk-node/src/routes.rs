//! HTTP surface: the payment webhook and a health check.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use dealdesk_settlement::Acknowledgment;
use serde::Serialize;

use crate::error::AppError;
use crate::node::NodeReconciler;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "payment-signature";

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<NodeReconciler>,
}

impl AppState {
    pub fn new(reconciler: Arc<NodeReconciler>) -> Self {
        Self { reconciler }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/payments", post(payment_webhook))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// A missing header is treated as an empty one and fails verification.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Acknowledgment>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ack = state.reconciler.handle_webhook(signature, &body)?;
    Ok(Json(ack))
}
