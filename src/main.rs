use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use myrad_backend::{
    api::{build_app, ApiComponents, SecurityMiddlewareConfig, SecurityState},
    config::{sanitize_for_logging, MyradConfig},
    database::DatabasePool,
};

/// How often expired pending proofs and stale rate-limit windows are dropped
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = MyradConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check MYRAD_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;

    info!("Starting MYRAD contribution backend");
    info!(
        "Privacy settings: k_threshold={}, reward_policy={}, dedup_window={}h",
        config.privacy.k_threshold, config.intake.reward_policy, config.intake.dedup_window_hours
    );

    let db = connect_database(&config).await?;
    let components = ApiComponents::from_config(&config, db);

    let security_state = SecurityState::new(SecurityMiddlewareConfig::from_config(&config));
    if config.logging.sanitize_logs {
        for key in &security_state.config.api_keys {
            debug!("Enterprise API key loaded: {}", sanitize_for_logging(key));
        }
    }

    spawn_housekeeping(&components, &security_state);

    let app = build_app(&components, security_state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("MYRAD backend listening on {}", bind_addr);
    info!(
        "Security middleware: Auth={}, Rate limit={}/min, Max body={}KB",
        config.security.enable_auth,
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Connect and migrate when PostgreSQL is enabled
async fn connect_database(config: &MyradConfig) -> Result<Option<Arc<DatabasePool>>> {
    if !config.database.postgres_enabled {
        warn!("PostgreSQL disabled - all state is in memory and lost on restart");
        return Ok(None);
    }

    let pool = DatabasePool::new(&config.database.postgres_url, config.database.max_connections)
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize database")?;
    pool.init_schema()
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to apply database schema")?;

    Ok(Some(Arc::new(pool)))
}

fn spawn_housekeeping(components: &ApiComponents, security_state: &SecurityState) {
    let pending = components.pending.clone();
    let rate_limiter = security_state.rate_limiter.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;

            let purged = pending.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = pending.len(), "Expired pending proofs purged");
            }
            rate_limiter.cleanup();
        }
    });
}

/// Initialize secure logging with sanitization
fn init_secure_logging(config: &MyradConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    } else {
        warn!("Log sanitization disabled - wallet addresses may be logged");
    }

    Ok(())
}
