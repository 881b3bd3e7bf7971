//! MYRAD Backend
//!
//! Wallet-gated data contribution service. Users submit verified behavioral
//! data (food orders, developer activity, watch history), earn points, and
//! their contributions are bucketed into k-anonymous cohorts and recorded in
//! an append-only consent ledger before enterprises can see them.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── models/        - Contributions, data types, sellable records
//! ├── cohort/        - k-anonymity cohort ids and registry
//! ├── consent/       - Privacy-hashed consent ledger
//! ├── rewards/       - Points and leagues
//! ├── pipeline/      - Per-provider transforms into sellable records
//! ├── proof/         - Proof callback parsing and pending hand-off cache
//! ├── users/         - Accounts, usernames, leaderboard
//! ├── intake/        - Submission orchestration and contribution store
//! ├── api/           - HTTP API endpoints
//! │   ├── user.rs       - Wallet-authenticated user surface
//! │   ├── proof.rs      - Proof callback and poll
//! │   ├── enterprise.rs - Cohorts, consent audit, dataset, insights
//! │   └── middleware.rs - Auth, rate limiting, headers, logging
//! └── database/      - PostgreSQL persistence
//! ```

pub mod api;
pub mod cohort;
pub mod config;
pub mod consent;
pub mod database;
pub mod intake;
pub mod models;
pub mod pipeline;
pub mod proof;
pub mod rewards;
pub mod users;

// Re-export main types for convenience
pub use config::MyradConfig;
pub use database::pool::DatabasePool;

pub use cohort::{derive_cohort_id, CohortRecord, CohortRegistry, CohortStats, DEFAULT_K_THRESHOLD};
pub use consent::{ConsentEntry, ConsentLedger, ConsentRequest, ConsentStats};
pub use intake::{ContributionIntake, ContributionStore, IntakeError, IntakeReceipt, SubmissionRequest};
pub use models::{Contribution, DataType, ProcessingMethod, SellableRecord};
pub use pipeline::{Pipeline, PipelineRegistry};
pub use proof::{PendingProof, PendingProofCache};
pub use rewards::{calculate_league, calculate_rewards, League, RewardBreakdown, RewardPolicy};
pub use users::{UserAccount, UserDirectory, UsernameError};

// Re-export API types
pub use api::{
    build_app, ApiComponents, EnterpriseApiState, ProofApiState, SecurityMiddlewareConfig,
    SecurityState, UserApiState,
};
