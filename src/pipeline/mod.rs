//! Enterprise Data Pipelines
//!
//! One pipeline per data type turns a raw contribution payload into a
//! [`SellableRecord`]. The registry dispatches by data type and bounds every
//! call with a timeout; any failure leaves the contribution on the raw path.
//!
//! ```text
//! payload ──► PipelineRegistry::run(data_type) ──► Some(SellableRecord)
//!                    │ error / timeout / no pipeline
//!                    └──────────────────────────────► None (stored raw)
//! ```

mod github;
mod netflix;
mod zomato;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{DataType, SellableRecord};

pub use github::GithubPipeline;
pub use netflix::NetflixPipeline;
pub use zomato::ZomatoPipeline;

/// Transform contract for one data type
#[async_trait::async_trait]
pub trait Pipeline: Send + Sync {
    fn data_type(&self) -> DataType;

    async fn transform(&self, payload: &Value) -> Result<SellableRecord>;
}

/// Data type -> pipeline dispatch
pub struct PipelineRegistry {
    pipelines: HashMap<DataType, Arc<dyn Pipeline>>,
    timeout: Duration,
}

impl PipelineRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pipelines: HashMap::new(),
            timeout,
        }
    }

    /// Registry with the built-in pipeline for every data type
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut registry = Self::new(timeout);
        registry.register(Arc::new(ZomatoPipeline));
        registry.register(Arc::new(GithubPipeline));
        registry.register(Arc::new(NetflixPipeline));
        registry
    }

    /// Replaces any pipeline already registered for the same data type
    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) {
        self.pipelines.insert(pipeline.data_type(), pipeline);
    }

    pub fn get(&self, data_type: DataType) -> Option<Arc<dyn Pipeline>> {
        self.pipelines.get(&data_type).cloned()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the pipeline for `data_type`. `None` means the contribution stays raw.
    pub async fn run(&self, data_type: DataType, payload: &Value) -> Option<SellableRecord> {
        let pipeline = match self.get(data_type) {
            Some(pipeline) => pipeline,
            None => {
                debug!(data_type = %data_type, "No pipeline registered");
                return None;
            }
        };

        match tokio::time::timeout(self.timeout, pipeline.transform(payload)).await {
            Ok(Ok(record)) => {
                debug!(
                    data_type = %data_type,
                    cohort_id = %record.cohort_id(),
                    "Pipeline produced sellable record"
                );
                Some(record)
            }
            Ok(Err(e)) => {
                warn!(data_type = %data_type, error = %e, "Pipeline failed, storing raw");
                None
            }
            Err(_) => {
                warn!(
                    data_type = %data_type,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Pipeline timed out, storing raw"
                );
                None
            }
        }
    }
}

// ============================================================================
// Shared field helpers
// ============================================================================

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%y", "%d/%m/%Y", "%B %d, %Y", "%d %b %Y"];

/// Accepts RFC 3339 timestamps and the plain date layouts providers export
pub(crate) fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

/// Numbers, or strings like "₹1,249.50"
pub(crate) fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

pub(crate) fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Earliest and latest of a set of timestamps
pub(crate) fn window(dates: &[DateTime<Utc>]) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (dates.iter().min().copied(), dates.iter().max().copied())
}

/// Months covered by a window, never less than one
pub(crate) fn months_covered(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> f64 {
    match (start, end) {
        (Some(start), Some(end)) => ((end - start).num_days() as f64 / 30.0).max(1.0),
        _ => 1.0,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
