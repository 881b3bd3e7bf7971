//! Proof hand-off API
//!
//! Endpoints (public):
//!   POST /reclaim/callback -> Proof service posts a verified proof
//!   GET /reclaim/pending/{wallet}/{provider} -> Client claims its proof
//!   GET /reclaim/proof/{proof_id} -> Peek at a pending proof

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::ApiError;
use crate::config::sanitize_for_logging;
use crate::proof::{decode_callback_body, parse_callback, PendingProofCache};

#[derive(Clone)]
pub struct ProofApiState {
    pub pending: Arc<PendingProofCache>,
}

pub async fn receive_callback(
    State(state): State<ProofApiState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let decoded = decode_callback_body(&body).ok_or_else(|| {
        warn!(bytes = body.len(), "Undecodable proof callback");
        ApiError::bad_request("No proofs provided")
    })?;

    let proof = parse_callback(&decoded, Utc::now()).map_err(|e| {
        warn!(error = %e, "Rejected proof callback");
        ApiError::bad_request(e)
    })?;

    let proof_id = proof.proof_id.clone();
    let wallet = proof
        .wallet_address
        .as_deref()
        .map(sanitize_for_logging)
        .unwrap_or_else(|| "none".to_string());
    let key = state.pending.insert(proof);

    info!(proof_id = %proof_id, key = %key, wallet = %wallet, "Stored pending proof");

    Ok(Json(json!({
        "success": true,
        "message": "Proof received",
        "proofId": proof_id,
    })))
}

pub async fn claim_pending(
    State(state): State<ProofApiState>,
    Path((wallet, provider)): Path<(String, String)>,
) -> Json<Value> {
    match state.pending.take(&wallet, &provider) {
        Some(proof) => {
            debug!(proof_id = %proof.proof_id, provider = %provider, "Pending proof claimed");
            Json(json!({ "success": true, "contribution": proof }))
        }
        None => Json(json!({
            "success": false,
            "message": "No pending contribution found",
        })),
    }
}

pub async fn peek_proof(
    State(state): State<ProofApiState>,
    Path(proof_id): Path<String>,
) -> Json<Value> {
    match state.pending.get_by_proof(&proof_id) {
        Some(proof) => Json(json!({ "success": true, "contribution": proof })),
        None => Json(json!({
            "success": false,
            "message": "No pending contribution found",
        })),
    }
}

pub fn create_router(state: ProofApiState) -> Router {
    Router::new()
        .route("/reclaim/callback", post(receive_callback))
        .route("/reclaim/pending/{wallet}/{provider}", get(claim_pending))
        .route("/reclaim/proof/{proof_id}", get(peek_proof))
        .with_state(state)
}
