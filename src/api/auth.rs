//! Wallet bearer tokens
//!
//! Accepted `Authorization: Bearer <token>` forms:
//!
//! ```text
//! wallet_0x<40 hex>
//! privy_0x<40 hex>_user
//! 0x<40 hex>
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;

/// The caller's wallet, lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletIdentity {
    pub wallet_address: String,
}

/// `0x` followed by exactly 40 hex digits
pub fn is_wallet_address(candidate: &str) -> bool {
    candidate
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Extract and normalize the wallet from a bearer token
pub fn parse_wallet_token(token: &str) -> Option<String> {
    let candidate = if let Some(rest) = token.strip_prefix("wallet_") {
        rest
    } else if let Some(rest) = token.strip_prefix("privy_") {
        rest.split('_').next()?
    } else {
        token
    };

    is_wallet_address(candidate).then(|| candidate.to_lowercase())
}

impl<S> FromRequestParts<S> for WalletIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid authorization token"))?;

        let wallet_address = parse_wallet_token(token).ok_or_else(|| {
            ApiError::unauthorized("Invalid token format - wallet address required")
        })?;

        Ok(WalletIdentity { wallet_address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    #[test]
    fn test_token_formats() {
        let expected = Some(WALLET.to_lowercase());

        assert_eq!(parse_wallet_token(&format!("wallet_{}", WALLET)), expected);
        assert_eq!(parse_wallet_token(&format!("privy_{}_user", WALLET)), expected);
        assert_eq!(parse_wallet_token(WALLET), expected);
    }

    #[test]
    fn test_rejects_malformed_wallets() {
        assert_eq!(parse_wallet_token("wallet_0x1234"), None);
        assert_eq!(parse_wallet_token("session_abcdef"), None);
        assert_eq!(parse_wallet_token(""), None);
        assert_eq!(
            parse_wallet_token("0xZZCdEf0123456789aBcDeF0123456789AbCdEf01"),
            None
        );
        assert_eq!(parse_wallet_token(&format!("{}00", WALLET)), None);
    }

    #[tokio::test]
    async fn test_extractor_requires_bearer() {
        let request = axum::http::Request::builder()
            .header("authorization", format!("Bearer wallet_{}", WALLET))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let identity = WalletIdentity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(identity.wallet_address, WALLET.to_lowercase());

        let request = axum::http::Request::builder()
            .header("authorization", WALLET)
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let rejection = WalletIdentity::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(rejection.status, axum::http::StatusCode::UNAUTHORIZED);
    }
}
