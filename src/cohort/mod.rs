//! k-Anonymity Cohort Registry
//!
//! Every sellable record is bucketed into a coarse cohort derived from its
//! category attributes. The registry counts members per cohort and flags a
//! cohort as compliant once it reaches the k threshold.
//!
//! ## Cohort Ids
//!
//! ```text
//! platform : city_cluster : spend_tier : frequency_tier
//! "Zomato", "Bengaluru-Urban", None, "weekly"  ->  zomato:bengaluruurban:unknown:weekly
//! ```
//!
//! Components are restricted to `[a-z0-9_]`, so the `:` delimiter can never
//! appear inside a component and distinct tuples never collide.
//!
//! ## Counting
//!
//! - `increment` is atomic per cohort id; distinct ids proceed independently
//! - `first_compliant_at` is stamped once, on the increment that reaches k
//! - store failures degrade to empty/default results

mod id;
mod registry;

pub use id::{derive_cohort_id, normalize_component, COHORT_ID_DELIMITER, COHORT_PLACEHOLDER};
pub use registry::{CohortRecord, CohortRegistry, CohortStats};

/// Members a cohort needs before its aggregates may be exposed
pub const DEFAULT_K_THRESHOLD: u64 = 10;
