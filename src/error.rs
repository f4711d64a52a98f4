//! Error types for the gamification engine

use thiserror::Error;

/// Every failure the engines, the store and the service can report.
///
/// "Not yet qualifying" is never an error: an achievement below its target is
/// a normal `unlocked: false` result.
#[derive(Debug, Error)]
pub enum GamificationError {
    /// Missing or malformed input (caller's fault)
    #[error("validation error: {0}")]
    Validation(String),

    /// A spend exceeded the available balance
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: i64 },

    /// A refund without a matching, not yet fully refunded spend
    #[error("invalid refund: {0}")]
    InvalidRefund(String),

    /// Non-positive XP amount
    #[error("invalid XP grant: {0} (must be positive)")]
    InvalidXpGrant(i64),

    /// Catalog entry with a requirement kind the engine does not know
    #[error("unknown requirement kind '{kind}' in achievement '{achievement}'")]
    UnknownRequirementKind { achievement: String, kind: String },

    /// Catalog failed validation (duplicate ids, zero targets, ...)
    #[error("invalid achievement catalog: {0}")]
    Catalog(String),

    /// The metrics backend could not be reached
    #[error("metrics source unavailable: {0}")]
    MetricsSourceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GamificationError {
    /// HTTP status code the API layer maps this error to
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidXpGrant(_) => 400,
            Self::InsufficientBalance { .. } | Self::InvalidRefund(_) => 409,
            Self::MetricsSourceUnavailable(_) => 503,
            Self::UnknownRequirementKind { .. }
            | Self::Catalog(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Io(_) => 500,
        }
    }

    /// Stable machine-readable error code for JSON responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InvalidRefund(_) => "invalid_refund",
            Self::InvalidXpGrant(_) => "invalid_xp_grant",
            Self::UnknownRequirementKind { .. } => "unknown_requirement_kind",
            Self::Catalog(_) => "invalid_catalog",
            Self::MetricsSourceUnavailable(_) => "metrics_source_unavailable",
            Self::Storage(_) => "storage_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, GamificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GamificationError::Validation("x".into()).status_code(), 400);
        assert_eq!(
            GamificationError::InsufficientBalance {
                requested: 600,
                available: 500
            }
            .status_code(),
            409
        );
        assert_eq!(
            GamificationError::MetricsSourceUnavailable("down".into()).status_code(),
            503
        );
    }

    #[test]
    fn test_display_includes_amounts() {
        let err = GamificationError::InsufficientBalance {
            requested: 600,
            available: 500,
        };
        let msg = err.to_string();
        assert!(msg.contains("600"));
        assert!(msg.contains("500"));
        assert_eq!(err.code(), "insufficient_balance");
    }
}
