// 🔐 Bearer-token authentication
// Tokens are issued by an external identity provider; this side only
// verifies them and resolves the owner identity.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Extract the token from an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, LedgerError> {
    let header = header.ok_or_else(|| LedgerError::Unauthorized("missing authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| LedgerError::Unauthorized("expected a bearer token".into()))?
        .trim();

    if token.is_empty() {
        return Err(LedgerError::Unauthorized("empty bearer token".into()));
    }
    Ok(token)
}

/// Identity-provider seam
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, LedgerError>;
}

/// Token table from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new(entries: &[TokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Identity {
                        uid: entry.uid.clone(),
                        email: entry.email.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Identity, LedgerError> {
        self.tokens.get(token).cloned().ok_or_else(|| {
            warn!("Rejected unknown bearer token");
            LedgerError::Unauthorized("unknown token".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> StaticTokenVerifier {
        StaticTokenVerifier::new(&[TokenEntry {
            token: "secret-token".to_string(),
            uid: "user-42".to_string(),
            email: Some("pat@example.com".to_string()),
        }])
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(bearer_token(None).is_err());
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer   ")).is_err());
    }

    #[test]
    fn test_static_verifier() {
        let verifier = verifier();
        assert_eq!(verifier.len(), 1);

        let identity = verifier.verify("secret-token").unwrap();
        assert_eq!(identity.uid, "user-42");
        assert_eq!(identity.email.as_deref(), Some("pat@example.com"));

        assert!(matches!(
            verifier.verify("forged"),
            Err(LedgerError::Unauthorized(_))
        ));
    }
}
