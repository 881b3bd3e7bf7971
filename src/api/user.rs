//! User API
//!
//! Endpoints (wallet bearer token):
//!   POST /auth/verify -> Get or create the caller's account
//!   POST /user/username -> Claim a username
//!   GET /user/profile -> Points, league, contribution count
//!   GET /user/points -> Balance and most recent point awards
//!   GET /user/contributions -> Caller's contributions, newest first
//!   POST /contribute -> Submit a contribution
//!
//! Public:
//!   GET /leaderboard?limit= -> Top users by points

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::auth::WalletIdentity;
use super::error::ApiError;
use crate::config::sanitize_for_logging;
use crate::intake::{ContributionIntake, ContributionStore, IntakeError, IntakeReceipt, SubmissionRequest};
use crate::models::{DataType, ProcessingMethod};
use crate::rewards::League;
use crate::users::{UserAccount, UserDirectory};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;
pub const POINTS_HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct UserApiState {
    pub users: Arc<UserDirectory>,
    pub store: Arc<ContributionStore>,
    pub intake: Arc<ContributionIntake>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub wallet_address: String,
    pub username: Option<String>,
    pub total_points: u64,
    pub league: League,
    pub contributions_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub last_contribution_at: Option<DateTime<Utc>>,
}

impl From<UserAccount> for UserView {
    fn from(user: UserAccount) -> Self {
        Self {
            id: user.id,
            wallet_address: user.wallet_address,
            username: user.username,
            total_points: user.total_points,
            league: user.league,
            contributions_count: user.contributions_count,
            created_at: user.created_at,
            last_active_at: user.last_active_at,
            last_contribution_at: user.last_contribution_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionView {
    pub id: String,
    pub data_type: DataType,
    pub processing_method: ProcessingMethod,
    pub points_awarded: u32,
    pub cohort_id: Option<String>,
    pub reclaim_proof_id: Option<String>,
    pub record_count: u64,
    pub has_sellable_data: bool,
    pub created_at: DateTime<Utc>,
}

/// One point award, derived from the contribution that earned it
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsAward {
    pub contribution_id: String,
    pub data_type: DataType,
    pub points: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributeRequest {
    pub anonymized_data: Option<Value>,
    pub data_type: Option<String>,
    pub reclaim_proof_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributeResponse {
    pub success: bool,
    pub contribution: IntakeReceipt,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: Option<String>,
    /// Shortened for display
    pub wallet_address: String,
    pub total_points: u64,
    pub league: League,
}

async fn require_user(state: &UserApiState, wallet: &str) -> Result<UserAccount, ApiError> {
    state
        .users
        .get_by_wallet(wallet)
        .await
        .map_err(|e| ApiError::internal("Load user", e, "Failed to load user"))?
        .ok_or_else(ApiError::user_not_found)
}

pub async fn verify(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
) -> Result<Json<Value>, ApiError> {
    let (user, created) = state
        .users
        .get_or_create(&identity.wallet_address)
        .await
        .map_err(|e| ApiError::internal("Auth verify", e, "Authentication failed"))?;

    if created {
        debug!(
            user_id = %user.id,
            wallet = %sanitize_for_logging(&user.wallet_address),
            "Wallet verified for new account"
        );
    } else if let Err(e) = state.users.touch(&user.id).await {
        warn!(user_id = %user.id, error = %e, "Failed to update activity");
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "created": created,
        "user": UserView::from(user),
    })))
}

pub async fn set_username(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
    Json(request): Json<UsernameRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = require_user(&state, &identity.wallet_address).await?;
    let username = request.username.unwrap_or_default();

    let updated = state.users.set_username(&user.id, username.trim()).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "username": updated.username,
    })))
}

pub async fn get_profile(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
) -> Result<Json<Value>, ApiError> {
    let user = require_user(&state, &identity.wallet_address).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "profile": UserView::from(user),
    })))
}

pub async fn get_points(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
) -> Result<Json<Value>, ApiError> {
    let user = require_user(&state, &identity.wallet_address).await?;

    let history: Vec<PointsAward> = state
        .store
        .by_user(&user.id)
        .await
        .map_err(|e| ApiError::internal("Points history", e, "Failed to fetch points"))?
        .into_iter()
        .take(POINTS_HISTORY_LIMIT)
        .map(|c| PointsAward {
            contribution_id: c.id,
            data_type: c.data_type,
            points: c.points_awarded,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "points": {
            "balance": user.total_points,
            "league": user.league,
            "history": history,
        },
    })))
}

pub async fn get_contributions(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
) -> Result<Json<Value>, ApiError> {
    let user = require_user(&state, &identity.wallet_address).await?;

    let contributions: Vec<ContributionView> = state
        .store
        .by_user(&user.id)
        .await
        .map_err(|e| ApiError::internal("List contributions", e, "Failed to fetch contributions"))?
        .into_iter()
        .map(|c| ContributionView {
            cohort_id: c.cohort_id().map(str::to_string),
            has_sellable_data: c.sellable_data.is_some(),
            id: c.id,
            data_type: c.data_type,
            processing_method: c.processing_method,
            points_awarded: c.points_awarded,
            reclaim_proof_id: c.proof_id,
            record_count: c.record_count,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "contributions": contributions,
    })))
}

pub async fn contribute(
    State(state): State<UserApiState>,
    identity: WalletIdentity,
    Json(request): Json<ContributeRequest>,
) -> Result<Json<ContributeResponse>, IntakeError> {
    let user = state
        .users
        .get_by_wallet(&identity.wallet_address)
        .await
        .map_err(|e| {
            warn!(error = %e, "User lookup failed");
            IntakeError::Internal(e)
        })?
        .ok_or(IntakeError::UserNotFound)?;

    let payload = request
        .anonymized_data
        .filter(|data| !data.is_null())
        .ok_or_else(|| IntakeError::Validation("anonymizedData is required".to_string()))?;
    let data_type = request
        .data_type
        .ok_or_else(|| IntakeError::Validation("dataType is required".to_string()))?;

    let receipt = state
        .intake
        .submit(SubmissionRequest {
            user_id: user.id,
            data_type,
            payload,
            proof_id: request.reclaim_proof_id,
        })
        .await?;

    let message = format!("Contribution received! You earned {} points.", receipt.points_awarded);

    Ok(Json(ContributeResponse {
        success: true,
        contribution: receipt,
        message,
    }))
}

/// `0xabcd...ef01`
fn display_wallet(wallet: &str) -> String {
    if wallet.len() <= 10 {
        return wallet.to_string();
    }
    format!("{}...{}", &wallet[..6], &wallet[wallet.len() - 4..])
}

pub async fn get_leaderboard(
    State(state): State<UserApiState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query
        .limit
        .filter(|&l| l > 0)
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LEADERBOARD_LIMIT);

    let leaderboard: Vec<LeaderboardEntry> = state
        .users
        .leaderboard(limit)
        .await
        .map_err(|e| ApiError::internal("Leaderboard", e, "Failed to fetch leaderboard"))?
        .into_iter()
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            rank: i + 1,
            username: user.username,
            wallet_address: display_wallet(&user.wallet_address),
            total_points: user.total_points,
            league: user.league,
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "leaderboard": leaderboard,
    })))
}

pub fn create_router(state: UserApiState) -> Router {
    Router::new()
        .route("/auth/verify", post(verify))
        .route("/user/username", post(set_username))
        .route("/user/profile", get(get_profile))
        .route("/user/points", get(get_points))
        .route("/user/contributions", get(get_contributions))
        .route("/contribute", post(contribute))
        .route("/leaderboard", get(get_leaderboard))
        .with_state(state)
}
