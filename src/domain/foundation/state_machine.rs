//! Transition table shared by the lifecycle enums.
//!
//! `DataState` (a session's collection progress) and `CircuitState` (a
//! breaker's gate) both implement [`StateMachine`]; mutations go through
//! [`StateMachine::transition_to`] so an illegal edge is an error instead of
//! a silent overwrite.

use super::ValidationError;

/// A closed set of states with an explicit edge list.
///
/// Only `can_transition_to` and `valid_transitions` are required; the two
/// must agree, which the implementors' tests check.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    fn can_transition_to(&self, target: &Self) -> bool;

    fn valid_transitions(&self) -> Vec<Self>;

    /// Moves to `target`, rejecting edges missing from the table.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if !self.can_transition_to(&target) {
            return Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ));
        }
        Ok(target)
    }

    /// A state with no outgoing edges.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
