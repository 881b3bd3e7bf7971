//! HTTP API endpoints for the MYRAD backend
//!
//! Provides REST APIs for:
//! - User surface (wallet bearer token): accounts, contributions, leaderboard
//! - Proof hand-off (public): proof service callback and client poll
//! - Enterprise surface (API key): cohorts, consent audit, dataset, insights
//! - Security middleware (auth, rate limiting, headers)

pub mod auth;
pub mod enterprise;
pub mod error;
pub mod middleware;
pub mod proof;
pub mod user;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cohort::CohortRegistry;
use crate::config::MyradConfig;
use crate::consent::ConsentLedger;
use crate::database::DatabasePool;
use crate::intake::{ContributionIntake, ContributionStore};
use crate::pipeline::PipelineRegistry;
use crate::proof::PendingProofCache;
use crate::users::UserDirectory;

pub use auth::{parse_wallet_token, WalletIdentity};
pub use enterprise::{create_router as create_enterprise_router, EnterpriseApiState};
pub use error::ApiError;
pub use middleware::{
    auth_middleware, body_size_middleware, logging_middleware, rate_limit_middleware,
    security_headers_middleware, RateLimiter, SecurityMiddlewareConfig, SecurityState,
};
pub use proof::{create_router as create_proof_router, ProofApiState};
pub use user::{create_router as create_user_router, UserApiState};

/// Shared components behind every router
#[derive(Clone)]
pub struct ApiComponents {
    pub users: Arc<UserDirectory>,
    pub store: Arc<ContributionStore>,
    pub intake: Arc<ContributionIntake>,
    pub cohorts: Arc<CohortRegistry>,
    pub consent: Arc<ConsentLedger>,
    pub pending: Arc<PendingProofCache>,
}

impl ApiComponents {
    /// Wire every component from configuration; `db` switches them all to PostgreSQL
    pub fn from_config(config: &MyradConfig, db: Option<Arc<DatabasePool>>) -> Self {
        let mut users = UserDirectory::new();
        let mut store = ContributionStore::new();
        let mut cohorts = CohortRegistry::new(config.privacy.k_threshold);
        let mut consent = ConsentLedger::new(config.privacy.consent_hash_salt.clone());

        if let Some(db) = db {
            users = users.with_database(db.clone());
            store = store.with_database(db.clone());
            cohorts = cohorts.with_database(db.clone());
            consent = consent.with_database(db);
        }

        let users = Arc::new(users);
        let store = Arc::new(store);
        let cohorts = Arc::new(cohorts);
        let consent = Arc::new(consent);
        let pipelines = Arc::new(PipelineRegistry::with_defaults(
            config.intake.pipeline_timeout(),
        ));

        let intake = Arc::new(ContributionIntake::new(
            users.clone(),
            store.clone(),
            cohorts.clone(),
            consent.clone(),
            pipelines,
            &config.intake,
        ));
        let pending = Arc::new(PendingProofCache::new(
            config.pending.ttl(),
            config.pending.capacity,
        ));

        Self {
            users,
            store,
            intake,
            cohorts,
            consent,
            pending,
        }
    }
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "myrad-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// Full application: routers under `/api`, `/health`, security layers
pub fn build_app(components: &ApiComponents, security_state: SecurityState) -> Router {
    let user_router = create_user_router(UserApiState {
        users: components.users.clone(),
        store: components.store.clone(),
        intake: components.intake.clone(),
    });
    let proof_router = create_proof_router(ProofApiState {
        pending: components.pending.clone(),
    });
    let enterprise_router = create_enterprise_router(EnterpriseApiState {
        cohorts: components.cohorts.clone(),
        consent: components.consent.clone(),
        store: components.store.clone(),
        users: components.users.clone(),
    });

    let max_request_size = security_state.config.max_request_size;

    Router::new()
        .nest(
            "/api",
            user_router.merge(proof_router).merge(enterprise_router),
        )
        .route("/health", get(health_check))
        // Layers run bottom-up: headers and tracing wrap everything
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(axum_middleware::from_fn_with_state(
            security_state,
            logging_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
