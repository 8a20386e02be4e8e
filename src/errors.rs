//! Error types for the pointdesk service
//!
//! One crate-wide taxonomy; the API layer maps variants onto HTTP codes.

use crate::common::types::{EntryId, GameId, PointCategory, Points};
use thiserror::Error;

/// Root error type for all pointdesk operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown member, game, entry, order, or item
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A hold or deduction exceeds the available balance
    #[error("insufficient {category} points: required {required}, available {available}")]
    InsufficientFunds {
        category: PointCategory,
        required: Points,
        available: Points,
    },

    /// Ledger entry is no longer pending (or no longer reversible)
    #[error("ledger entry {0} is already finalized")]
    AlreadyFinalized(EntryId),

    /// Lost the settlement claim race for a game
    #[error("game {0} is already settled")]
    AlreadySettled(GameId),

    /// Permission gate denied the caller
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Underlying store failure
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display() {
        let err = Error::validation("amount must not be zero");
        assert!(err.to_string().contains("validation failed"));
        assert!(err.to_string().contains("amount must not be zero"));
    }

    #[test]
    fn test_insufficient_funds_details() {
        let err = Error::InsufficientFunds {
            category: PointCategory::General,
            required: 1200,
            available: 1000,
        };
        assert!(err.to_string().contains("general"));
        assert!(err.to_string().contains("required 1200"));
        assert!(err.to_string().contains("available 1000"));
    }

    #[test]
    fn test_not_found_display() {
        let id = Uuid::new_v4();
        let err = Error::not_found("member", id);
        assert!(err.to_string().contains("member"));
        assert!(err.to_string().contains(&id.to_string()));
    }
}
