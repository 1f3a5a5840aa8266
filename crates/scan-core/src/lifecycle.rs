//! Broadcast loop lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `Idle -> Running -> Stopped`. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl LoopState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Stopped)
                | (Self::Running, Self::Stopped)
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(LoopState::Idle.can_transition_to(LoopState::Running));
        assert!(LoopState::Running.can_transition_to(LoopState::Stopped));
        assert!(!LoopState::Stopped.can_transition_to(LoopState::Running));
        assert!(!LoopState::Running.can_transition_to(LoopState::Idle));
    }
}
