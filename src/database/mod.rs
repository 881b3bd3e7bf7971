//! PostgreSQL Database Module
//!
//! Provides persistence for cohorts, the consent ledger, contributions and
//! users. Every component falls back to in-memory state when no pool is
//! configured.

pub mod cohorts;
pub mod consent;
pub mod contributions;
pub mod pool;
pub mod users;

pub use cohorts::CohortRepository;
pub use consent::ConsentRepository;
pub use contributions::ContributionRepository;
pub use pool::DatabasePool;
pub use users::UserRepository;

/// Failure of a write that may collide with a unique index
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("{0}")]
    Failed(String),
}

impl WriteError {
    pub(crate) fn from_sqlx(context: &str, e: sqlx::Error) -> Self {
        let conflict = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if conflict {
            WriteError::Conflict(format!("{}: {}", context, e))
        } else {
            WriteError::Failed(format!("{}: {}", context, e))
        }
    }
}
