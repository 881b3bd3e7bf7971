//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::cohorts::CohortRepository;
use crate::database::consent::ConsentRepository;
use crate::database::contributions::ContributionRepository;
use crate::database::users::UserRepository;

pub struct DatabasePool {
    pool: PgPool,
    cohorts: CohortRepository,
    consent: ConsentRepository,
    contributions: ContributionRepository,
    users: UserRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            cohorts: CohortRepository::new(pool.clone()),
            consent: ConsentRepository::new(pool.clone()),
            contributions: ContributionRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            pool,
        })
    }

    /// Apply the embedded migrations under `migrations/`
    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Applying database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| format!("Failed to run migrations: {}", e))?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn cohorts(&self) -> &CohortRepository {
        &self.cohorts
    }

    pub fn consent(&self) -> &ConsentRepository {
        &self.consent
    }

    pub fn contributions(&self) -> &ContributionRepository {
        &self.contributions
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
