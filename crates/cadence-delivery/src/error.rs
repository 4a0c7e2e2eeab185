//! Error types for the delivery subsystem.

use cadence_core::error::CadenceError;
use cadence_core::types::MessageId;

use crate::state::DeliveryState;

/// Errors returned to callers of the delivery orchestrator.
///
/// Failures of an accepted delivery never surface here; they become an
/// apology notification on the assistant message instead.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a delivery is already in flight for message {0}")]
    Busy(MessageId),
    #[error("invalid delivery transition: {0} -> {1}")]
    InvalidTransition(DeliveryState, DeliveryState),
    #[error("scenario error: {0}")]
    Scenario(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<DeliveryError> for CadenceError {
    fn from(err: DeliveryError) -> Self {
        CadenceError::Delivery(err.to_string())
    }
}

impl From<CadenceError> for DeliveryError {
    fn from(err: CadenceError) -> Self {
        DeliveryError::Scenario(err.to_string())
    }
}
