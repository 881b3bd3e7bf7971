use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::rewards::RewardPolicy;

/// Configuration for the MYRAD backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyradConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// k-anonymity and consent hashing
    pub privacy: PrivacyConfig,
    /// Contribution intake tuning
    pub intake: IntakeConfig,
    /// Proof callback hand-off cache
    pub pending: PendingConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Require API keys on enterprise endpoints
    pub enable_auth: bool,
    /// Static keys accepted on enterprise endpoints (exact match)
    #[serde(skip_serializing)]
    pub enterprise_api_keys: Vec<String>,
    /// Rate limit per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Salt prepended to user ids and wallets before hashing
    #[serde(skip_serializing)]
    pub consent_hash_salt: String,
    /// Members a cohort needs before it counts as k-anonymous
    pub k_threshold: u64,
}

/// One year
pub const MAX_DEDUP_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Upper bound on a single pipeline transform
    pub pipeline_timeout_secs: u64,
    /// Trailing window for content-based duplicate detection
    pub dedup_window_hours: i64,
    /// Record counts closer than this are considered the same data
    pub dedup_record_tolerance: u64,
    /// Which reward rule governs the point award
    pub reward_policy: RewardPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    /// How long an unclaimed proof stays retrievable
    pub ttl_secs: u64,
    /// Maximum number of cached proofs
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Enable log sanitization to prevent sensitive data exposure
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(skip_serializing)]
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/myrad".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            pipeline_timeout_secs: 30,
            dedup_window_hours: 24,
            dedup_record_tolerance: 3,
            reward_policy: RewardPolicy::QualityScore,
        }
    }
}

impl IntakeConfig {
    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            capacity: 10_000,
        }
    }
}

impl PendingConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for MyradConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
            },
            security: SecurityConfig {
                enable_auth: true,
                enterprise_api_keys: Vec::new(),
                rate_limit_per_minute: 120,
                max_request_size: 5 * 1024 * 1024,
            },
            privacy: PrivacyConfig {
                consent_hash_salt: String::new(), // Must be set via environment
                k_threshold: crate::cohort::DEFAULT_K_THRESHOLD,
            },
            intake: IntakeConfig::default(),
            pending: PendingConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
        }
    }
}

impl MyradConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("MYRAD_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("MYRAD_PORT") {
            config.server.port = port.parse().context("Invalid MYRAD_PORT value")?;
        }

        // Security configuration
        if let Ok(enable_auth) = env::var("MYRAD_ENABLE_AUTH") {
            config.security.enable_auth = enable_auth
                .parse()
                .context("Invalid MYRAD_ENABLE_AUTH value")?;
        }

        if let Ok(rate_limit) = env::var("MYRAD_RATE_LIMIT_PER_MINUTE") {
            config.security.rate_limit_per_minute = rate_limit
                .parse()
                .context("Invalid MYRAD_RATE_LIMIT_PER_MINUTE value")?;
        }

        if let Ok(size) = env::var("MYRAD_MAX_REQUEST_SIZE") {
            config.security.max_request_size = size
                .parse()
                .context("Invalid MYRAD_MAX_REQUEST_SIZE value")?;
        }

        config.security.enterprise_api_keys = Self::load_enterprise_keys();

        // Privacy configuration
        config.privacy.consent_hash_salt = env::var("MYRAD_CONSENT_HASH_SALT").unwrap_or_else(|_| {
            warn!("MYRAD_CONSENT_HASH_SALT not set, using default (not recommended for production)");
            "myrad_consent_salt_change_in_production".to_string()
        });

        if let Ok(k) = env::var("MYRAD_K_THRESHOLD") {
            config.privacy.k_threshold = k.parse().context("Invalid MYRAD_K_THRESHOLD value")?;
        }

        // Intake configuration
        if let Ok(timeout) = env::var("MYRAD_PIPELINE_TIMEOUT_SECS") {
            config.intake.pipeline_timeout_secs = timeout
                .parse()
                .context("Invalid MYRAD_PIPELINE_TIMEOUT_SECS value")?;
        }

        if let Ok(hours) = env::var("MYRAD_DEDUP_WINDOW_HOURS") {
            config.intake.dedup_window_hours = hours
                .parse()
                .context("Invalid MYRAD_DEDUP_WINDOW_HOURS value")?;
        }

        if let Ok(policy) = env::var("MYRAD_REWARD_POLICY") {
            config.intake.reward_policy = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid MYRAD_REWARD_POLICY value")?;
        }

        // Pending proof cache
        if let Ok(ttl) = env::var("MYRAD_PENDING_TTL_SECS") {
            config.pending.ttl_secs = ttl.parse().context("Invalid MYRAD_PENDING_TTL_SECS value")?;
        }

        if let Ok(capacity) = env::var("MYRAD_PENDING_CAPACITY") {
            config.pending.capacity = capacity
                .parse()
                .context("Invalid MYRAD_PENDING_CAPACITY value")?;
        }

        // Database configuration
        if let Ok(url) = env::var("MYRAD_POSTGRES_URL").or_else(|_| env::var("DATABASE_URL")) {
            config.database.postgres_url = url;
        }

        if let Ok(enabled) = env::var("MYRAD_POSTGRES_ENABLED") {
            config.database.postgres_enabled = enabled
                .parse()
                .context("Invalid MYRAD_POSTGRES_ENABLED value")?;
        }

        // Logging configuration
        if let Ok(log_level) = env::var("MYRAD_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Ok(sanitize_logs) = env::var("MYRAD_SANITIZE_LOGS") {
            config.logging.sanitize_logs = sanitize_logs
                .parse()
                .context("Invalid MYRAD_SANITIZE_LOGS value")?;
        }

        if let Ok(log_requests) = env::var("MYRAD_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid MYRAD_LOG_REQUESTS value")?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Enterprise keys from MYRAD_ENTERPRISE_API_KEY plus the comma-separated
    /// MYRAD_ENTERPRISE_API_KEYS list
    fn load_enterprise_keys() -> Vec<String> {
        let mut keys = Vec::new();

        if let Ok(key) = env::var("MYRAD_ENTERPRISE_API_KEY") {
            if !key.is_empty() {
                keys.push(key);
            }
        }

        if let Ok(extra_keys) = env::var("MYRAD_ENTERPRISE_API_KEYS") {
            for key in extra_keys.split(',') {
                let key = key.trim();
                if !key.is_empty() {
                    keys.push(key.to_string());
                }
            }
        }

        if keys.is_empty() {
            warn!("No enterprise API keys configured - enterprise endpoints will reject all requests");
        } else {
            info!("Loaded {} enterprise API key(s)", keys.len());
        }

        keys
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.privacy.k_threshold == 0 {
            return Err(anyhow::anyhow!("k-anonymity threshold must be at least 1"));
        }

        if self.privacy.consent_hash_salt.len() < 16 {
            return Err(anyhow::anyhow!(
                "Consent hash salt is too short (minimum 16 characters)"
            ));
        }

        if self.intake.pipeline_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Pipeline timeout must be non-zero"));
        }

        if !(1..=MAX_DEDUP_WINDOW_HOURS).contains(&self.intake.dedup_window_hours) {
            return Err(anyhow::anyhow!(
                "Dedup window must be between 1 and {} hours, got {}",
                MAX_DEDUP_WINDOW_HOURS,
                self.intake.dedup_window_hours
            ));
        }

        // Pending proofs should outlive a wallet round-trip but not linger
        if !(120..=600).contains(&self.pending.ttl_secs) {
            return Err(anyhow::anyhow!(
                "Pending proof TTL must be between 120 and 600 seconds, got {}",
                self.pending.ttl_secs
            ));
        }

        if self.pending.capacity == 0 {
            return Err(anyhow::anyhow!("Pending proof capacity must be non-zero"));
        }

        for key in &self.security.enterprise_api_keys {
            if key.len() < 24 {
                return Err(anyhow::anyhow!(
                    "Enterprise API key is too short (minimum 24 characters)"
                ));
            }
        }

        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "PostgreSQL is enabled but no connection string is configured"
            ));
        }

        Ok(())
    }
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();

    // Wallet addresses keep the 0x prefix and a short tail
    if data.starts_with("0x") {
        let head: String = chars[..6].iter().collect();
        return format!("{}...{}", head, tail);
    }

    let head: String = chars[..4].iter().collect();
    format!("{}***{}", head, tail)
}
