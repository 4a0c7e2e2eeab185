//! Delivery lifecycle state machine.
//!
//! Enforces valid transitions for one conversation's delivery slot:
//! - Idle -> Pending (placeholder created)
//! - Pending -> Streaming (first content chunk applied)
//! - Pending/Streaming -> Done | Failed (terminal notification emitted)
//! - Done/Failed -> Idle (slot released)
//! - Pending/Streaming -> Idle (conversation reset, delivery abandoned)

use std::fmt;

use crate::error::DeliveryError;

/// Operational state of a conversation's delivery slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// No delivery in progress. Ready to accept a submission.
    Idle,
    /// Placeholder registered, no content applied yet.
    Pending,
    /// At least one content chunk applied.
    Streaming,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Idle => write!(f, "Idle"),
            DeliveryState::Pending => write!(f, "Pending"),
            DeliveryState::Streaming => write!(f, "Streaming"),
            DeliveryState::Done => write!(f, "Done"),
            DeliveryState::Failed => write!(f, "Failed"),
        }
    }
}

impl DeliveryState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &DeliveryState) -> bool {
        matches!(
            (self, target),
            (DeliveryState::Idle, DeliveryState::Pending)
                | (DeliveryState::Pending, DeliveryState::Streaming)
                | (DeliveryState::Pending, DeliveryState::Done)
                | (DeliveryState::Pending, DeliveryState::Failed)
                | (DeliveryState::Streaming, DeliveryState::Done)
                | (DeliveryState::Streaming, DeliveryState::Failed)
                | (DeliveryState::Done, DeliveryState::Idle)
                | (DeliveryState::Failed, DeliveryState::Idle)
                // Abandon transitions
                | (DeliveryState::Pending, DeliveryState::Idle)
                | (DeliveryState::Streaming, DeliveryState::Idle)
        )
    }

    /// A new submission must be refused in this state.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DeliveryState::Pending | DeliveryState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Done | DeliveryState::Failed)
    }
}

/// Validated holder of a [`DeliveryState`].
///
/// Not synchronized; the conversation store owns it behind its own lock.
#[derive(Debug, Clone)]
pub struct DeliveryTracker {
    state: DeliveryState,
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryTracker {
    /// Create a tracker initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: DeliveryState::Idle,
        }
    }

    pub fn current(&self) -> DeliveryState {
        self.state
    }

    /// Attempt to transition to the target state.
    pub fn transition(&mut self, target: DeliveryState) -> Result<(), DeliveryError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Delivery state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else {
            Err(DeliveryError::InvalidTransition(self.state, target))
        }
    }

    /// Force the tracker back to Idle.
    pub fn reset(&mut self) {
        if self.state != DeliveryState::Idle {
            tracing::debug!("Delivery state reset to Idle from {}", self.state);
        }
        self.state = DeliveryState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_happy_path_cycle() {
        let mut t = DeliveryTracker::new();
        t.transition(DeliveryState::Pending).unwrap();
        t.transition(DeliveryState::Streaming).unwrap();
        t.transition(DeliveryState::Done).unwrap();
        t.transition(DeliveryState::Idle).unwrap();
        assert_eq!(t.current(), DeliveryState::Idle);
    }

    #[test]
    fn test_pending_can_finish_without_content() {
        assert!(DeliveryState::Pending.can_transition_to(&DeliveryState::Done));
        assert!(DeliveryState::Pending.can_transition_to(&DeliveryState::Failed));
    }

    #[test]
    fn test_terminal_returns_to_idle() {
        assert!(DeliveryState::Done.can_transition_to(&DeliveryState::Idle));
        assert!(DeliveryState::Failed.can_transition_to(&DeliveryState::Idle));
    }

    #[test]
    fn test_in_flight_can_be_abandoned() {
        assert!(DeliveryState::Pending.can_transition_to(&DeliveryState::Idle));
        assert!(DeliveryState::Streaming.can_transition_to(&DeliveryState::Idle));
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_idle_cannot_skip_pending() {
        assert!(!DeliveryState::Idle.can_transition_to(&DeliveryState::Streaming));
        assert!(!DeliveryState::Idle.can_transition_to(&DeliveryState::Done));
    }

    #[test]
    fn test_terminal_cannot_resume_streaming() {
        assert!(!DeliveryState::Done.can_transition_to(&DeliveryState::Streaming));
        assert!(!DeliveryState::Failed.can_transition_to(&DeliveryState::Pending));
        assert!(!DeliveryState::Done.can_transition_to(&DeliveryState::Failed));
    }

    #[test]
    fn test_streaming_cannot_go_back_to_pending() {
        assert!(!DeliveryState::Streaming.can_transition_to(&DeliveryState::Pending));
    }

    #[test]
    fn test_invalid_transition_reports_states() {
        let mut t = DeliveryTracker::new();
        let err = t.transition(DeliveryState::Done).unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::InvalidTransition(DeliveryState::Idle, DeliveryState::Done)
        ));
        assert_eq!(t.current(), DeliveryState::Idle);
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    #[test]
    fn test_in_flight_states() {
        assert!(!DeliveryState::Idle.is_in_flight());
        assert!(DeliveryState::Pending.is_in_flight());
        assert!(DeliveryState::Streaming.is_in_flight());
        assert!(!DeliveryState::Done.is_in_flight());
        assert!(!DeliveryState::Failed.is_in_flight());
    }

    #[test]
    fn test_reset_from_streaming() {
        let mut t = DeliveryTracker::new();
        t.transition(DeliveryState::Pending).unwrap();
        t.transition(DeliveryState::Streaming).unwrap();
        t.reset();
        assert_eq!(t.current(), DeliveryState::Idle);
    }

    #[test]
    fn test_display() {
        assert_eq!(DeliveryState::Streaming.to_string(), "Streaming");
        assert_eq!(DeliveryState::Failed.to_string(), "Failed");
    }
}
