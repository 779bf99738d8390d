//! # Planning service interfaces
//!
//! The motion executable does not plan or execute motion itself. Everything it needs from the
//! planning/execution service and from the planning scene is expressed by the traits in this
//! module, so that the goal lifecycle can be driven against any implementation.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::{
    geom::Pose,
    planner::{CartesianPath, Constraints, ErrorCode, Motion, MotionPlan},
    scene::CollisionObject,
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while talking to the planning service.
///
/// These are faults of the interface itself. Planning or execution failures reported by the
/// service are returned as [`ErrorCode`]s instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MoveIfaceError {
    #[error("The planning service is not connected")]
    NotConnected,

    #[error("No response to {0} within the timeout")]
    Timeout(&'static str),

    #[error("Transport error during {0}: {1}")]
    Transport(&'static str, String),

    #[error("The planning service could not process {0}: {1}")]
    Rejected(&'static str, String),

    #[error("Unexpected response to {0}: {1}")]
    UnexpectedResponse(&'static str, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MoveIfaceError {
    /// Returns true if the error leaves the connection to the service in an unknown state.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            MoveIfaceError::NotConnected
                | MoveIfaceError::Timeout(_)
                | MoveIfaceError::Transport(_, _)
        )
    }
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Move interface of the planning/execution service.
///
/// All calls block until the service has answered. `plan`, `compute_cartesian_path` and
/// `execute` may block for the whole duration of planning or motion.
#[cfg_attr(test, mockall::automock)]
pub trait MoveInterface: Send {
    /// Set the goal to a named, predefined robot state.
    fn set_named_target(&mut self, name: &str) -> Result<(), MoveIfaceError>;

    /// Plan to the current target.
    fn plan(&mut self) -> Result<(ErrorCode, MotionPlan), MoveIfaceError>;

    /// Compute a Cartesian path through `waypoints`.
    fn compute_cartesian_path(
        &mut self,
        waypoints: &[Pose],
        eef_step_m: f64,
        jump_threshold: f64,
        avoid_collisions: bool,
        constraints: Option<Constraints>,
    ) -> Result<CartesianPath, MoveIfaceError>;

    /// Execute a plan or trajectory, blocking until motion has finished.
    fn execute(&mut self, motion: &Motion) -> Result<ErrorCode, MoveIfaceError>;

    /// Stop any motion in progress.
    fn stop(&mut self) -> Result<(), MoveIfaceError>;

    fn get_current_pose(&mut self) -> Result<Pose, MoveIfaceError>;

    fn get_planning_frame(&mut self) -> Result<String, MoveIfaceError>;

    fn get_end_effector_link(&mut self) -> Result<String, MoveIfaceError>;

    fn set_max_velocity_scaling(&mut self, factor: f64) -> Result<(), MoveIfaceError>;

    fn set_max_acceleration_scaling(&mut self, factor: f64) -> Result<(), MoveIfaceError>;

    /// Units: seconds
    fn set_planning_time(&mut self, time_s: f64) -> Result<(), MoveIfaceError>;

    fn set_planner_id(&mut self, planner_id: &str) -> Result<(), MoveIfaceError>;

    fn set_num_planning_attempts(&mut self, attempts: u32) -> Result<(), MoveIfaceError>;

    /// Replace the active path constraints. An empty set clears them.
    fn set_path_constraints(&mut self, constraints: Constraints) -> Result<(), MoveIfaceError>;

    /// Units: meters
    fn set_goal_tolerance(&mut self, tolerance_m: f64) -> Result<(), MoveIfaceError>;

    fn set_pose_reference_frame(&mut self, frame: &str) -> Result<(), MoveIfaceError>;
}

/// Planning scene of the planning service.
#[cfg_attr(test, mockall::automock)]
pub trait PlanningScene: Send {
    /// Apply a collision object to the scene.
    fn apply_collision_object(&mut self, object: &CollisionObject) -> Result<(), MoveIfaceError>;
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_connection_faults() {
        assert!(MoveIfaceError::NotConnected.is_connection_fault());
        assert!(MoveIfaceError::Timeout("Plan").is_connection_fault());
        assert!(MoveIfaceError::Transport("Plan", String::from("EFSM")).is_connection_fault());
        assert!(!MoveIfaceError::Rejected("Plan", String::new()).is_connection_fault());
        assert!(!MoveIfaceError::UnexpectedResponse("Plan", String::new()).is_connection_fault());
    }
}
