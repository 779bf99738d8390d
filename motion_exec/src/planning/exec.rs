//! # Execution driver
//!
//! Runs a synthesised motion on the robot and turns the reported status into a terminal outcome.
//! Any outcome other than success leaves the robot stopped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::planner::{ErrorCode, Motion};
use log::{debug, warn};

use crate::{
    goal_mgr::Termination,
    move_iface::{MoveIfaceError, MoveInterface},
};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Execute `motion`, blocking until the service reports a status.
pub fn execute(iface: &mut dyn MoveInterface, motion: &Motion) -> Result<ErrorCode, MoveIfaceError> {
    let traj = motion.trajectory();
    debug!(
        "Executing trajectory of {} points over {} joints",
        traj.points.len(),
        traj.joint_names.len()
    );

    let status = iface.execute(motion)?;

    debug!("Execution finished with status {}", status);

    Ok(status)
}

/// Conclude a goal from its execution status.
///
/// The goal succeeds only if the status is a success and the system is still operational,
/// otherwise the robot is stopped and the goal aborted with the status.
pub fn conclude(
    iface: &mut dyn MoveInterface,
    status: ErrorCode,
    operational: bool,
) -> Result<Termination, MoveIfaceError> {
    if status.is_success() && operational {
        return Ok(Termination::succeeded());
    }

    iface.stop()?;

    let message = match operational {
        true => format!("Execution failed with status {}", status),
        false => String::from("Shutting down"),
    };
    warn!("{}", message);

    Ok(Termination::aborted(Some(status), message))
}

/// Stop the robot and abort with the given status.
pub fn stop_and_abort<S: Into<String>>(
    iface: &mut dyn MoveInterface,
    error_code: Option<ErrorCode>,
    message: S,
) -> Result<Termination, MoveIfaceError> {
    iface.stop()?;

    Ok(Termination::aborted(error_code, message))
}

/// Stop the robot and cancel.
pub fn stop_and_cancel<S: Into<String>>(
    iface: &mut dyn MoveInterface,
    message: S,
) -> Result<Termination, MoveIfaceError> {
    iface.stop()?;

    Ok(Termination::canceled(message))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::move_iface::MockMoveInterface;
    use comms_if::{eqpt::planner::RobotTrajectory, goal::GoalOutcome};

    #[test]
    fn test_success_does_not_stop() {
        let mut mock = MockMoveInterface::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(ErrorCode::SUCCESS));
        mock.expect_stop().never();

        let motion = Motion::Trajectory(RobotTrajectory::default());
        let status = execute(&mut mock, &motion).unwrap();
        let term = conclude(&mut mock, status, true).unwrap();

        assert_eq!(term.outcome, GoalOutcome::Succeeded);
    }

    #[test]
    fn test_failure_stops_and_aborts() {
        let mut mock = MockMoveInterface::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(ErrorCode::CONTROL_FAILED));
        mock.expect_stop().times(1).returning(|| Ok(()));

        let motion = Motion::Trajectory(RobotTrajectory::default());
        let status = execute(&mut mock, &motion).unwrap();
        let term = conclude(&mut mock, status, true).unwrap();

        assert_eq!(term.outcome, GoalOutcome::Aborted);
        assert_eq!(term.error_code, Some(ErrorCode::CONTROL_FAILED));
    }

    #[test]
    fn test_not_operational_aborts() {
        let mut mock = MockMoveInterface::new();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let term = conclude(&mut mock, ErrorCode::SUCCESS, false).unwrap();
        assert_eq!(term.outcome, GoalOutcome::Aborted);
    }
}
