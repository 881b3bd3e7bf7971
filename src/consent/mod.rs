//! Consent Ledger
//!
//! Immutable audit trail of every data ingestion. Raw user ids and wallets
//! never reach the log: both are replaced by SHA-256(salt || raw) before an
//! entry is built.

mod entry;
mod ledger;

pub use entry::{
    ConsentEntry, ConsentRequest, ConsentStats, DataSummary, DateRange, IdentityHasher,
    Verification, VerificationMethod, CONSENT_SCOPE, CONSENT_TYPE_EXPLICIT, DEFAULT_DATASET_SOURCE,
};
pub use ledger::ConsentLedger;
