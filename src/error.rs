// 🚨 Error types for the HSA ledger
// Three user-facing failure classes: authentication, service, parse

use thiserror::Error;

/// Failures while turning analysis text into ledger rows
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    /// Text failed both the direct parse and the cleanup retry
    #[error("receipt text is not valid JSON after cleanup")]
    Unparseable,

    /// JSON parsed but does not have the receipt shape
    #[error("receipt data has an invalid format: {0}")]
    InvalidFormat(String),

    /// Receipt parsed but nothing on it is HSA-eligible
    #[error("no HSA-eligible items found")]
    NoEligibleItems,
}

impl ExtractionError {
    /// Fixed message shown to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            ExtractionError::Unparseable => "Unable to parse the receipt data. Please try again.",
            ExtractionError::InvalidFormat(_) => "Invalid receipt data format. Please try again.",
            ExtractionError::NoEligibleItems => "No HSA-eligible items found in the receipt.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Service,
    Parse,
    Request,
    NotFound,
    Storage,
}

/// Library-level error
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Analysis service unreachable, misconfigured, or returned an error
    #[error("analysis service error: {0}")]
    Service(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("expense not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::Unauthorized(_) => ErrorCategory::Authentication,
            LedgerError::Service(_) => ErrorCategory::Service,
            LedgerError::Extraction(_) => ErrorCategory::Parse,
            LedgerError::InvalidRequest(_) => ErrorCategory::Request,
            LedgerError::NotFound(_) => ErrorCategory::NotFound,
            LedgerError::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Message safe to show in the UI; internal details stay in the logs
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Unauthorized(_) => "Unauthorized".to_string(),
            LedgerError::Service(_) => {
                "An error occurred while analyzing the image. Please try again.".to_string()
            }
            LedgerError::Extraction(e) => e.user_message().to_string(),
            LedgerError::InvalidRequest(msg) => msg.clone(),
            LedgerError::NotFound(_) => "Expense not found".to_string(),
            LedgerError::Storage(_) => "Unable to save expenses. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_messages_are_fixed() {
        assert_eq!(
            ExtractionError::Unparseable.user_message(),
            "Unable to parse the receipt data. Please try again."
        );
        assert_eq!(
            ExtractionError::InvalidFormat("missing items".into()).user_message(),
            "Invalid receipt data format. Please try again."
        );
        assert_eq!(
            ExtractionError::NoEligibleItems.user_message(),
            "No HSA-eligible items found in the receipt."
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            LedgerError::Unauthorized("bad token".into()).category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            LedgerError::Service("timeout".into()).category(),
            ErrorCategory::Service
        );
        assert_eq!(
            LedgerError::from(ExtractionError::Unparseable).category(),
            ErrorCategory::Parse
        );
        assert_eq!(
            LedgerError::from(anyhow::anyhow!("disk full")).category(),
            ErrorCategory::Storage
        );
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = LedgerError::Service("HTTP 503 from upstream, key=abc".into());
        assert!(!err.user_message().contains("abc"));
    }
}
