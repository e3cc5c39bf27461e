//! Control protocol state machine.
//!
//! One control invocation walks the device from discovery to a verified
//! write. Every step is a state; the machine enforces the legal order and
//! records each transition so a failed run can be diagnosed afterwards.
//!
//! # States
//!
//! - `Idle`: invocation accepted, nothing touched yet
//! - `CheckingPermission`: querying Bluetooth authorization
//! - `OpeningAdapter`: initializing the adapter
//! - `Scanning`: looking for the device by numeric id
//! - `Connecting`: opening the GATT link
//! - `DiscoveringServices`: waiting for the control service
//! - `DiscoveringCharacteristics`: locating the write characteristic
//! - `Writing`: sending command frames
//! - `VerifyingStatus`: watching the advertisement for a status change
//! - `Success` / `Failed`: terminal
//!
//! # Valid Transitions
//!
//! - Idle → CheckingPermission → OpeningAdapter → Scanning → Connecting
//! - Connecting → DiscoveringServices → DiscoveringCharacteristics → Writing
//! - Writing → VerifyingStatus → Success
//! - Writing → Success (verification disabled)
//! - Idle → OpeningAdapter (permission check disabled)
//! - any non-terminal state → Failed
//!
//! # Examples
//!
//! ```
//! use cellar_control::{ControlState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! machine.transition_to(ControlState::CheckingPermission).unwrap();
//! machine.transition_to(ControlState::Failed).unwrap();
//!
//! assert!(machine.current_state().is_terminal());
//! assert!(machine.transition_to(ControlState::Scanning).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;

use cellar_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of state transitions to keep in history.
///
/// A full run records nine transitions, so the cap only bites on machines
/// reused across many invocations.
pub const MAX_HISTORY_SIZE: usize = 100;

/// Phase of a control invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Idle,
    CheckingPermission,
    OpeningAdapter,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Writing,
    VerifyingStatus,
    Success,
    Failed,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ControlState::Idle => "Idle",
            ControlState::CheckingPermission => "CheckingPermission",
            ControlState::OpeningAdapter => "OpeningAdapter",
            ControlState::Scanning => "Scanning",
            ControlState::Connecting => "Connecting",
            ControlState::DiscoveringServices => "DiscoveringServices",
            ControlState::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            ControlState::Writing => "Writing",
            ControlState::VerifyingStatus => "VerifyingStatus",
            ControlState::Success => "Success",
            ControlState::Failed => "Failed",
        };
        f.write_str(state_str)
    }
}

impl ControlState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cellar_control::ControlState;
    ///
    /// assert!(ControlState::Writing.can_transition_to(&ControlState::Success));
    /// assert!(ControlState::Connecting.can_transition_to(&ControlState::Failed));
    /// assert!(!ControlState::Scanning.can_transition_to(&ControlState::Writing));
    /// assert!(!ControlState::Success.can_transition_to(&ControlState::Failed));
    /// ```
    pub fn can_transition_to(&self, target: &ControlState) -> bool {
        use ControlState::*;

        if *target == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, target),
            (Idle, CheckingPermission | OpeningAdapter)
                | (CheckingPermission, OpeningAdapter)
                | (OpeningAdapter, Scanning)
                | (Scanning, Connecting)
                | (Connecting, DiscoveringServices)
                | (DiscoveringServices, DiscoveringCharacteristics)
                | (DiscoveringCharacteristics, Writing)
                | (Writing, VerifyingStatus | Success)
                | (VerifyingStatus, Success)
        )
    }

    /// Whether the invocation has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlState::Success | ControlState::Failed)
    }

    /// Whether the state involves the radio.
    pub fn uses_radio(&self) -> bool {
        !matches!(
            self,
            ControlState::Idle
                | ControlState::CheckingPermission
                | ControlState::Success
                | ControlState::Failed
        )
    }
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ControlState,
    pub to: ControlState,
    pub timestamp: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: ControlState, to: ControlState) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
        }
    }
}

/// State machine for one control invocation.
///
/// Not thread-safe; a protocol run owns its machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current_state: ControlState,
    state_entered_at: DateTime<Utc>,
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: ControlState::Idle,
            state_entered_at: Utc::now(),
            history: VecDeque::with_capacity(16),
        }
    }

    pub fn current_state(&self) -> &ControlState {
        &self.current_state
    }

    /// When the current state was entered.
    pub fn state_entered_at(&self) -> DateTime<Utc> {
        self.state_entered_at
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Get the last N state transitions.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not
    /// allowed from the current state. The machine is left unchanged.
    pub fn transition_to(&mut self, new_state: ControlState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.current_state = new_state;
        self.state_entered_at = transition.timestamp;
        self.add_to_history(transition.clone());

        Ok(transition)
    }

    /// Move to `Failed` unless already terminal.
    ///
    /// Returns the transition, or `None` if the machine had already ended.
    pub fn fail(&mut self) -> Option<StateTransition> {
        self.transition_to(ControlState::Failed).ok()
    }

    /// Consume the machine, returning its history.
    pub fn into_history(self) -> Vec<StateTransition> {
        self.history.into_iter().collect()
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
