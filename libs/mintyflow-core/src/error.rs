//! Error types for mintyflow-core.

use thiserror::Error;

/// Result type alias using ValidationError.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Entity invariant violations, raised before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("{field} must not be negative")]
    NegativeValue { field: &'static str },

    #[error("transfer requires a destination wallet")]
    MissingDestination,

    #[error("transfer destination must differ from source wallet {0}")]
    SelfTransfer(String),

    #[error("only transfers may carry a destination wallet")]
    UnexpectedDestination,

    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("end date precedes start date")]
    InvertedWindow,
}

/// Rule violations when applying a settings mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsRuleError {
    #[error("currency {0} is not supported")]
    UnknownCurrency(String),

    #[error("currency {0} is already tracked")]
    DuplicateCurrency(String),

    #[error("base currency cannot be changed once set")]
    BaseCurrencyLocked,
}
