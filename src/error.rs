use crate::domain::actor::ActorId;
use crate::domain::money::Balance;
use crate::domain::order::OrderStatus;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum OrderError {
    #[error("Invalid order: {0}")]
    #[diagnostic(code(niaga::invalid_order))]
    InvalidOrder(String),

    #[error("Stale state: expected {expected}, found {actual}")]
    #[diagnostic(
        code(niaga::stale_state),
        help("Re-read the order and decide whether the action still applies")
    )]
    StaleState {
        expected: String,
        actual: String,
    },

    #[error("Insufficient funds for {actor}: requested {requested}, available {available}")]
    #[diagnostic(code(niaga::insufficient_funds))]
    InsufficientFunds {
        actor: ActorId,
        requested: u64,
        available: Balance,
    },

    #[error("Balance of {actor} would overflow")]
    #[diagnostic(code(niaga::balance_overflow))]
    BalanceOverflow { actor: ActorId },

    #[error("A driver is already assigned")]
    #[diagnostic(code(niaga::already_assigned))]
    AlreadyAssigned,

    #[error("Funds for this order were already released")]
    #[diagnostic(code(niaga::already_settled))]
    AlreadySettled,

    #[error("Unauthorized: {0}")]
    #[diagnostic(code(niaga::unauthorized))]
    Unauthorized(String),

    #[error("Proof of payment is required")]
    #[diagnostic(code(niaga::missing_proof))]
    MissingProof,

    #[error("Order can no longer be cancelled (status: {0})")]
    #[diagnostic(code(niaga::cannot_cancel))]
    CannotCancel(OrderStatus),

    #[error("Transition from {from} to {to} is not allowed")]
    #[diagnostic(code(niaga::invalid_transition))]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    #[diagnostic(code(niaga::not_found))]
    NotFound(String),

    #[error("Amount must be positive")]
    #[diagnostic(code(niaga::invalid_amount))]
    InvalidAmount,

    #[error("Offer from driver {0} has expired")]
    #[diagnostic(code(niaga::offer_expired))]
    OfferExpired(ActorId),

    #[error("Order was already reviewed")]
    #[diagnostic(code(niaga::already_reviewed))]
    AlreadyReviewed,

    #[error("Configuration error: {0}")]
    #[diagnostic(code(niaga::config))]
    Config(String),

    #[error("Storage error: {0}")]
    #[diagnostic(code(niaga::storage))]
    Storage(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(niaga::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    #[diagnostic(code(niaga::csv))]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(niaga::io))]
    Io(#[from] std::io::Error),
}

impl OrderError {
    /// Conflicts an automated caller can swallow: somebody else already
    /// performed the action.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            OrderError::AlreadySettled | OrderError::AlreadyAssigned | OrderError::StaleState { .. }
        )
    }

    pub(crate) fn stale(expected: impl ToString, actual: impl ToString) -> Self {
        OrderError::StaleState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn transition(from: impl ToString, to: impl ToString) -> Self {
        OrderError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for OrderError {
    fn from(err: rocksdb::Error) -> Self {
        OrderError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
