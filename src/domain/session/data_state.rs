//! Data collection lifecycle of a session.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Where a session stands in the fact-collection dialogue.
///
/// - `Initial`: created, no user turn yet
/// - `Collecting`: required fields still missing
/// - `AwaitingConfirmation`: a proposed value needs a yes/no from the user
/// - `Complete`: every required field present, nothing in conflict
/// - `Exported`: handed to report rendering
/// - `Expired`: inactive longer than its TTL
/// - `Error`: the last turn could not be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataState {
    #[default]
    Initial,
    Collecting,
    AwaitingConfirmation,
    Complete,
    Exported,
    Expired,
    Error,
}

impl DataState {
    /// Returns true if the collected fields may be exported.
    pub fn is_exportable(&self) -> bool {
        matches!(self, Self::Complete | Self::Exported)
    }
}

impl fmt::Display for DataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::Collecting => "collecting",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Complete => "complete",
            Self::Exported => "exported",
            Self::Expired => "expired",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl StateMachine for DataState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use DataState::*;
        matches!(
            (self, target),
            // First turn
            (Initial, Collecting) |
            (Initial, AwaitingConfirmation) |
            (Initial, Complete) |
            // Gathering loop
            (Collecting, Collecting) |
            (Collecting, AwaitingConfirmation) |
            (Collecting, Complete) |
            // Clarifying question answered
            (AwaitingConfirmation, Collecting) |
            (AwaitingConfirmation, AwaitingConfirmation) |
            // Export request
            (Complete, Exported) |
            // Next turn after a failed write recomputes the state
            (Error, Collecting) |
            (Error, AwaitingConfirmation) |
            (Error, Complete) |
            (Error, Exported) |
            // Inactivity
            (Initial, Expired) |
            (Collecting, Expired) |
            (AwaitingConfirmation, Expired) |
            (Complete, Expired) |
            (Exported, Expired) |
            (Error, Expired)
        ) || (*target == Error && *self != Expired)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use DataState::*;
        match self {
            Initial => vec![Collecting, AwaitingConfirmation, Complete, Expired, Error],
            Collecting => vec![Collecting, AwaitingConfirmation, Complete, Expired, Error],
            AwaitingConfirmation => vec![Collecting, AwaitingConfirmation, Expired, Error],
            Complete => vec![Exported, Expired, Error],
            Exported => vec![Expired, Error],
            Error => vec![Collecting, AwaitingConfirmation, Complete, Exported, Expired, Error],
            Expired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DataState; 7] = [
        DataState::Initial,
        DataState::Collecting,
        DataState::AwaitingConfirmation,
        DataState::Complete,
        DataState::Exported,
        DataState::Expired,
        DataState::Error,
    ];

    mod definition {
        use super::*;

        #[test]
        fn default_state_is_initial() {
            assert_eq!(DataState::default(), DataState::Initial);
        }

        #[test]
        fn serializes_to_snake_case() {
            let json = serde_json::to_string(&DataState::AwaitingConfirmation).unwrap();
            assert_eq!(json, "\"awaiting_confirmation\"");
        }

        #[test]
        fn display_matches_serialized_form() {
            for state in ALL {
                let json = serde_json::to_string(&state).unwrap();
                assert_eq!(json.trim_matches('"'), state.to_string());
            }
        }
    }

    mod transitions {
        use super::*;

        #[test]
        fn collecting_can_loop_on_itself() {
            assert!(DataState::Collecting.can_transition_to(&DataState::Collecting));
        }

        #[test]
        fn awaiting_confirmation_cannot_jump_to_complete() {
            assert!(!DataState::AwaitingConfirmation.can_transition_to(&DataState::Complete));
        }

        #[test]
        fn only_complete_can_be_exported() {
            for state in ALL {
                let allowed = state.can_transition_to(&DataState::Exported);
                let expected = matches!(state, DataState::Complete | DataState::Error);
                assert_eq!(allowed, expected, "{:?} -> Exported", state);
            }
        }

        #[test]
        fn any_live_state_can_fail() {
            for state in ALL {
                if state != DataState::Expired {
                    assert!(state.can_transition_to(&DataState::Error), "{:?}", state);
                }
            }
        }

        #[test]
        fn expired_is_terminal() {
            assert!(DataState::Expired.is_terminal());
        }

        #[test]
        fn can_transition_to_is_consistent_with_valid_transitions() {
            for state in ALL {
                for target in state.valid_transitions() {
                    assert!(state.can_transition_to(&target), "{:?} -> {:?}", state, target);
                }
            }
        }
    }
}
