//! Proof Hand-off
//!
//! The proof service calls back with a verified proof; the client polls for
//! it afterwards and submits it as a contribution.
//!
//! ```text
//! POST /api/reclaim/callback ──► parse_callback ──► PendingProofCache::insert
//! GET  /api/reclaim/pending/{wallet}/{provider} ──► PendingProofCache::take
//! ```

mod callback;
mod pending;

pub use callback::{decode_callback_body, parse_callback, PendingProof, UNKNOWN_PROVIDER};
pub use pending::{PendingProofCache, FALLBACK_WINDOW};
