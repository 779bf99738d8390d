//! # Goal protocol module
//!
//! This module provides the request/response and event messages exchanged between a requester
//! and the motion executable. A requester submits a [`MotionGoal`], may cancel it, and receives
//! exactly one [`GoalEvent`] when the goal reaches a terminal outcome.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use std::fmt;
use thiserror::Error;

// Internal
use crate::eqpt::{geom::Pose, planner::ErrorCode};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A motion request.
///
/// Exactly one of `state`, `pose_array` or `destination` is expected to be populated. An empty
/// name, an empty sequence, or a destination with a zero coordinate means "not this kind".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionGoal {
    /// Name of a predefined robot pose.
    pub state: String,

    /// Ordered end effector waypoints.
    pub pose_array: Vec<Pose>,

    /// Single end effector destination.
    pub destination: Pose,

    /// Maximum velocity scaling factor, in `(0, 1]`.
    pub velocity: f64,

    /// Maximum acceleration scaling factor, in `(0, 1]`.
    pub acceleration: f64,
}

/// Identifier assigned to a goal on acceptance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub u64);

/// Result delivered with a terminal outcome.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalResult {
    pub success: bool,
}

/// Progress feedback for a goal.
///
/// Carries no fields yet, reserved for progress reporting.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalFeedback {}

/// Terminal notification for a goal, published once per accepted goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub goal_id: GoalId,
    pub outcome: GoalOutcome,
    pub result: GoalResult,

    /// Planner status code which caused the outcome, if any.
    pub error_code: Option<ErrorCode>,

    /// Human readable description of the outcome.
    pub message: String,

    pub timestamp: DateTime<Utc>,
}

/// Status of a goal as reported by a status request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStatus {
    pub goal_id: GoalId,
    pub state: GoalState,
    pub outcome: Option<GoalOutcome>,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// The final, write-once outcome of a goal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalOutcome {
    Succeeded,
    Aborted,
    Canceled,
}

/// Lifecycle states of an accepted goal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalState {
    Received,
    Dispatched,
    Configuring,
    Synthesizing,
    CancelCheck1,
    Executing,
    CancelCheck2,
    Terminal(GoalOutcome),
}

/// Requests a requester can make of the motion executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionRequest {
    /// Submit a new goal.
    Submit(MotionGoal),

    /// Request cancellation of a goal.
    Cancel(GoalId),

    /// Query the status of a goal.
    Status(GoalId),
}

/// Responses to an [`ActionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionResponse {
    /// The goal was accepted and dispatched under the given ID.
    Accepted(GoalId),

    /// The goal carried no recognised payload and was rejected.
    Rejected,

    /// The cancellation request was accepted.
    CancelAccepted,

    Status(GoalStatus),

    /// No live or recently finished goal has the requested ID.
    UnknownGoal,

    /// The request could not be parsed.
    Invalid,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum GoalParseError {
    #[error("Request contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Request has an invalid type ({0})")]
    InvalidType(String),

    #[error("Request of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl ActionRequest {
    /// Parse a new request from a JSON packet.
    ///
    /// The packet must be an object with a single key naming the request type (`Submit`, `Cancel`
    /// or `Status`) mapped to its payload.
    pub fn from_json(json_str: &str) -> Result<Self, GoalParseError> {
        // Parse the JSON string into a value
        let val: Value = serde_json::from_str(json_str).map_err(GoalParseError::InvalidJson)?;

        // Get the type of the request
        let (req_type, payload) = match val {
            Value::Object(o) if o.len() == 1 => o.into_iter().next(),
            _ => None,
        }
        .ok_or_else(|| {
            GoalParseError::InvalidType(String::from(
                "Expected an object with a single request type key",
            ))
        })?;

        let parsed = match req_type.as_str() {
            "Submit" => serde_json::from_value(payload).map(ActionRequest::Submit),
            "Cancel" => serde_json::from_value(payload).map(ActionRequest::Cancel),
            "Status" => serde_json::from_value(payload).map(ActionRequest::Status),
            _ => {
                return Err(GoalParseError::InvalidType(format!(
                    "{} is not a recognised request type",
                    req_type
                )))
            }
        };

        parsed.map_err(|e| GoalParseError::InvalidPayload(req_type, e))
    }
}

impl GoalOutcome {
    /// The result reported alongside this outcome.
    pub fn result(&self) -> GoalResult {
        GoalResult {
            success: matches!(self, GoalOutcome::Succeeded),
        }
    }
}

impl GoalState {
    /// Returns true if the state is absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalState::Terminal(_))
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
