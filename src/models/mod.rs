//! Contribution data models
//!
//! Contains the shared data structures for:
//! - Supported data types and their row tables
//! - Accepted contributions
//! - Sellable records produced by the pipelines

pub mod contribution;
pub mod sellable;

pub use contribution::{Contribution, DataType, ProcessingMethod};
pub use sellable::{
    AggregationStatus, AudienceSegment, DataCoverage, DataQuality, GeoData, PrivacyCompliance,
    RecordMetadata, SellableRecord, SELLABLE_SCHEMA_VERSION,
};
