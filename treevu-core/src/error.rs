//! Typed errors for treevü domain operations

use thiserror::Error;

/// Validation and rule errors raised by domain operations.
///
/// None of these are fatal: the caller reports them and the user retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreevuError {
    /// An amount was negative, zero where a positive value is required, or not finite
    #[error("invalid amount for {field}: {value}")]
    InvalidAmount {
        /// Field that carried the amount
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// A required field was empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A RUC did not pass local format/check-digit validation
    #[error("invalid RUC: {0}")]
    InvalidRuc(String),

    /// Lookup by id failed
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("expense", "goal", ...)
        kind: &'static str,
        /// Requested id
        id: String,
    },

    /// The goal is no longer accepting contributions
    #[error("goal {0} is not active")]
    GoalNotActive(String),

    /// Sender does not hold enough treevüs
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance {
        /// Current balance
        available: u64,
        /// Requested amount
        requested: u64,
    },

    /// Member is not part of the tribe
    #[error("{member} is not a member of {tribe}")]
    NotAMember {
        /// Member id
        member: String,
        /// Tribe id
        tribe: String,
    },

    /// Kudos must go to someone else
    #[error("cannot send kudos to yourself")]
    SelfKudos,

    /// Prestige is only available at the top tier
    #[error("prestige requires reaching {0}")]
    PrestigeLocked(&'static str),
}

/// Result type alias for treevü domain operations
pub type Result<T> = std::result::Result<T, TreevuError>;

/// Reject negative, NaN and infinite amounts.
pub fn ensure_non_negative(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(TreevuError::InvalidAmount { field, value });
    }
    Ok(value)
}

/// Reject zero, negative, NaN and infinite amounts.
pub fn ensure_positive(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TreevuError::InvalidAmount { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_guards() {
        assert_eq!(ensure_non_negative("total", 0.0), Ok(0.0));
        assert!(ensure_non_negative("total", -0.01).is_err());
        assert!(ensure_non_negative("total", f64::NAN).is_err());
        assert!(ensure_positive("amount", 0.0).is_err());
        assert_eq!(ensure_positive("amount", 5.0), Ok(5.0));
    }

    #[test]
    fn test_error_messages() {
        let e = TreevuError::InsufficientBalance { available: 10, requested: 50 };
        assert_eq!(e.to_string(), "insufficient balance: have 10, need 50");
    }
}
