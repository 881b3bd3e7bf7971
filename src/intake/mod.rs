//! Contribution Intake
//!
//! Entry point for every data contribution. Decides accept / duplicate /
//! rate-limited, runs the pipeline, awards points and records the cohort and
//! consent side effects.

mod error;
mod service;
mod store;

pub use error::IntakeError;
pub use service::{ContributionIntake, IntakeReceipt, SubmissionRequest};
pub use store::ContributionStore;
