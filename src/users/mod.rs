//! User Directory
//!
//! Accounts are keyed by lowercased wallet address and created on first
//! `/api/auth/verify`. Points and league only change through
//! `record_contribution`.

mod account;
mod directory;

pub use account::{validate_username, UserAccount, UsernameError, MAX_USERNAME_LEN, MIN_USERNAME_LEN};
pub use directory::UserDirectory;
