//! Error types for the DealDesk engine.
//!
//! All errors use the `DD_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Negotiation errors
//! - 2xx: Order / escrow ledger errors
//! - 3xx: Settlement (webhook) errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{ListingId, OfferId, OfferStatus, OrderId};

/// Central error enum for all DealDesk operations.
#[derive(Debug, Error)]
pub enum DealdeskError {
    // =================================================================
    // Negotiation Errors (1xx)
    // =================================================================
    /// Malformed economic input. Rejected before any state mutation.
    #[error("DD_ERR_100: Invalid terms: {reason}")]
    InvalidTerms { reason: String },

    /// The actor performed the most recent action on this offer.
    #[error("DD_ERR_101: It is not your turn")]
    NotYourTurn,

    /// The actor is neither the buyer nor the seller of this offer
    /// (or not the buyer, for a withdrawal).
    #[error("DD_ERR_102: Actor is not a party to this offer")]
    NotAParty,

    /// The offer is in a terminal status.
    #[error("DD_ERR_103: This offer can no longer be acted on (status {status})")]
    Terminal { status: OfferStatus },

    /// The offer's expiry timestamp has passed.
    #[error("DD_ERR_104: Offer has expired")]
    Expired,

    /// The requested offer does not exist.
    #[error("DD_ERR_105: Offer not found: {0}")]
    OfferNotFound(OfferId),

    /// A compare-and-swap lost against a concurrent writer.
    #[error("DD_ERR_106: Concurrent modification, reload and retry")]
    ConcurrentModification,

    // =================================================================
    // Order / Escrow Errors (2xx)
    // =================================================================
    /// The requested order does not exist.
    #[error("DD_ERR_200: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested transition is not legal from the current status.
    #[error("DD_ERR_201: This order can no longer be acted on: {reason}")]
    IllegalTransition { reason: String },

    /// The catalog has no such listing.
    #[error("DD_ERR_202: Listing not found: {0}")]
    ListingNotFound(ListingId),

    // =================================================================
    // Settlement Errors (3xx)
    // =================================================================
    /// The webhook payload failed authenticity verification.
    #[error("DD_ERR_300: Invalid webhook signature: {reason}")]
    InvalidSignature { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Storage layer failure.
    #[error("DD_ERR_900: Persistence failure: {0}")]
    Persistence(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("DD_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("DD_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("DD_ERR_903: Internal error: {0}")]
    Internal(String),

    /// I/O error (disk, network).
    #[error("DD_ERR_904: I/O error: {0}")]
    Io(String),
}

impl DealdeskError {
    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::ConcurrentModification)
    }

    /// Whether the error is caused by the acting user's input and is
    /// correctable on their side.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTerms { .. }
                | Self::NotYourTurn
                | Self::NotAParty
                | Self::Terminal { .. }
                | Self::Expired
                | Self::IllegalTransition { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DealdeskError>;

impl From<std::io::Error> for DealdeskError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DealdeskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = DealdeskError::OfferNotFound(OfferId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("DD_ERR_105"), "Got: {msg}");
    }

    #[test]
    fn turn_violation_reads_naturally() {
        let msg = DealdeskError::NotYourTurn.to_string();
        assert!(msg.contains("not your turn"));
    }

    #[test]
    fn terminal_display_names_status() {
        let err = DealdeskError::Terminal {
            status: OfferStatus::Accepted,
        };
        let msg = format!("{err}");
        assert!(msg.contains("DD_ERR_103"));
        assert!(msg.contains("can no longer be acted on"));
        assert!(msg.contains("accepted"));
    }

    #[test]
    fn retryable_classification() {
        assert!(DealdeskError::Persistence("disk".into()).is_retryable());
        assert!(DealdeskError::ConcurrentModification.is_retryable());
        assert!(!DealdeskError::NotYourTurn.is_retryable());
        assert!(
            !DealdeskError::InvalidSignature {
                reason: "bad".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn gate_violations_are_client_errors() {
        assert!(DealdeskError::NotAParty.is_client_error());
        assert!(DealdeskError::Expired.is_client_error());
        assert!(!DealdeskError::Persistence("x".into()).is_client_error());
    }

    #[test]
    fn all_errors_have_dd_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(DealdeskError::NotYourTurn),
            Box::new(DealdeskError::ConcurrentModification),
            Box::new(DealdeskError::Internal("test".into())),
            Box::new(DealdeskError::IllegalTransition {
                reason: "x".into(),
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("DD_ERR_"),
                "Error missing DD_ERR_ prefix: {msg}"
            );
        }
    }
}
