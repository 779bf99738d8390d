//! # Goal handle
//!
//! The live record of one accepted goal. It is shared between the goal manager, which answers
//! cancel and status requests, and the worker driving the goal.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
    Mutex, PoisonError,
};

use chrono::Utc;
use comms_if::{
    eqpt::planner::ErrorCode,
    goal::{GoalEvent, GoalId, GoalOutcome, GoalState, GoalStatus, MotionGoal},
};
use log::{debug, info, warn};

use super::GoalKind;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GoalHandle {
    id: GoalId,

    goal: MotionGoal,

    kind: GoalKind,

    /// Set by a cancel request, polled by the worker at its checkpoints.
    cancel_requested: AtomicBool,

    state: Mutex<GoalState>,

    terminal: Mutex<TerminalSlot>,
}

/// How a goal ended, before it is turned into an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    pub outcome: GoalOutcome,

    /// Planner status which caused the outcome, if any.
    pub error_code: Option<ErrorCode>,

    pub message: String,
}

/// The write-once terminal outcome and where to report it.
struct TerminalSlot {
    event: Option<GoalEvent>,
    event_sender: Sender<GoalEvent>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GoalHandleError {
    #[error("Goal {0} already has a terminal outcome ({1:?})")]
    AlreadyTerminal(GoalId, GoalOutcome),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalHandle {
    pub fn new(
        id: GoalId,
        goal: MotionGoal,
        kind: GoalKind,
        event_sender: Sender<GoalEvent>,
    ) -> Self {
        Self {
            id,
            goal,
            kind,
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(GoalState::Received),
            terminal: Mutex::new(TerminalSlot {
                event: None,
                event_sender,
            }),
        }
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn goal(&self) -> &MotionGoal {
        &self.goal
    }

    pub fn kind(&self) -> GoalKind {
        self.kind
    }

    /// Request cancellation of the goal.
    ///
    /// Repeated requests have no further effect. Returns true if this was the first request.
    pub fn request_cancel(&self) -> bool {
        let first = !self.cancel_requested.swap(true, Ordering::SeqCst);

        if first {
            info!("Cancellation of goal {} requested", self.id);
        }

        first
    }

    pub fn is_canceling(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> GoalState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the goal to a new non-terminal state.
    ///
    /// Once a goal is terminal its state no longer changes.
    pub fn set_state(&self, new_state: GoalState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.is_terminal() {
            warn!(
                "Goal {} is terminal, ignoring transition to {:?}",
                self.id, new_state
            );
            return;
        }

        debug!("Goal {}: {:?} -> {:?}", self.id, *state, new_state);
        *state = new_state;
    }

    pub fn outcome(&self) -> Option<GoalOutcome> {
        self.terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .event
            .as_ref()
            .map(|e| e.outcome)
    }

    pub fn status(&self) -> GoalStatus {
        GoalStatus {
            goal_id: self.id,
            state: self.state(),
            outcome: self.outcome(),
        }
    }

    /// Write the terminal outcome of the goal and report it.
    ///
    /// The outcome can be written once only, a second write is an error and is not reported.
    pub fn finish(&self, termination: Termination) -> Result<GoalEvent, GoalHandleError> {
        let mut slot = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(ref event) = slot.event {
            return Err(GoalHandleError::AlreadyTerminal(self.id, event.outcome));
        }

        let event = GoalEvent {
            goal_id: self.id,
            outcome: termination.outcome,
            result: termination.outcome.result(),
            error_code: termination.error_code,
            message: termination.message,
            timestamp: Utc::now(),
        };

        // Set the state directly, terminal states are absorbing
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            GoalState::Terminal(event.outcome);

        match event.outcome {
            GoalOutcome::Succeeded => info!("Goal {} succeeded", self.id),
            GoalOutcome::Aborted => warn!("Goal {} aborted: {}", self.id, event.message),
            GoalOutcome::Canceled => warn!("Goal {} canceled: {}", self.id, event.message),
        }

        if slot.event_sender.send(event.clone()).is_err() {
            warn!("No receiver for the terminal event of goal {}", self.id);
        }

        slot.event = Some(event.clone());

        Ok(event)
    }
}

impl Termination {
    pub fn succeeded() -> Self {
        Self {
            outcome: GoalOutcome::Succeeded,
            error_code: Some(ErrorCode::SUCCESS),
            message: String::from("Motion completed"),
        }
    }

    pub fn aborted<S: Into<String>>(error_code: Option<ErrorCode>, message: S) -> Self {
        Self {
            outcome: GoalOutcome::Aborted,
            error_code,
            message: message.into(),
        }
    }

    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self {
            outcome: GoalOutcome::Canceled,
            error_code: None,
            message: message.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::channel;

    fn handle() -> (GoalHandle, std::sync::mpsc::Receiver<GoalEvent>) {
        let (tx, rx) = channel();
        let goal = MotionGoal {
            state: String::from("home"),
            ..Default::default()
        };
        (GoalHandle::new(GoalId(7), goal, GoalKind::NamedTarget, tx), rx)
    }

    #[test]
    fn test_outcome_written_once() {
        let (handle, rx) = handle();
        assert_eq!(handle.outcome(), None);

        let event = handle.finish(Termination::succeeded()).unwrap();
        assert_eq!(event.goal_id, GoalId(7));
        assert!(event.result.success);

        assert_eq!(
            handle.finish(Termination::aborted(None, "late")),
            Err(GoalHandleError::AlreadyTerminal(
                GoalId(7),
                GoalOutcome::Succeeded
            ))
        );

        // Only one event was reported
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(handle.outcome(), Some(GoalOutcome::Succeeded));
        assert_eq!(handle.state(), GoalState::Terminal(GoalOutcome::Succeeded));
    }

    #[test]
    fn test_cancel_idempotent() {
        let (handle, _rx) = handle();
        assert!(!handle.is_canceling());
        assert!(handle.request_cancel());
        assert!(!handle.request_cancel());
        assert!(handle.is_canceling());
    }

    #[test]
    fn test_terminal_state_absorbing() {
        let (handle, _rx) = handle();
        handle.set_state(GoalState::Synthesizing);
        assert_eq!(handle.state(), GoalState::Synthesizing);

        handle.finish(Termination::canceled("test")).unwrap();
        handle.set_state(GoalState::Executing);
        assert_eq!(handle.state(), GoalState::Terminal(GoalOutcome::Canceled));

        let status = handle.status();
        assert_eq!(status.outcome, Some(GoalOutcome::Canceled));
        assert!(!handle.finish(Termination::succeeded()).is_ok());
    }
}
