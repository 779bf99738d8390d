//! # Trajectory synthesis
//!
//! Produces the motion for a goal. Named targets are planned in joint space, waypoint sequences
//! and destinations become Cartesian paths. Only a complete result may be executed, partial
//! Cartesian paths are treated as planning failures.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::planner::{Constraints, ErrorCode, Motion, RobotTrajectory},
    goal::MotionGoal,
};
use log::{debug, warn};

use super::PlannerCfgParams;
use crate::{
    goal_mgr::GoalKind,
    move_iface::{MoveIfaceError, MoveInterface},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The outcome of synthesis for one goal.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// The motion to execute, if the service produced one.
    pub motion: Option<Motion>,

    /// Fraction of the requested Cartesian path that was achieved. `None` for named targets,
    /// whose planning either succeeds or fails.
    pub fraction: Option<f64>,

    pub error_code: ErrorCode,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SynthesisResult {
    /// Returns true if the result may be executed.
    pub fn is_executable(&self, operational: bool) -> bool {
        let complete = match self.fraction {
            Some(f) => is_full_path(f),
            None => self.error_code.is_success(),
        };

        complete && self.motion.is_some() && operational
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Returns true if a Cartesian path fraction means the whole path was achieved.
pub fn is_full_path(fraction: f64) -> bool {
    fraction > 0.0 && (fraction - 1.0).abs() <= f64::EPSILON
}

/// Synthesise the motion for `goal`.
///
/// `constraints` are passed along with destination paths only, waypoint paths are computed
/// unconstrained.
pub fn synthesise(
    iface: &mut dyn MoveInterface,
    goal: &MotionGoal,
    kind: GoalKind,
    constraints: &Constraints,
    params: &PlannerCfgParams,
) -> Result<SynthesisResult, MoveIfaceError> {
    match kind {
        GoalKind::NamedTarget => {
            debug!("Planning to named target \"{}\"", goal.state);

            iface.set_named_target(&goal.state)?;
            let (error_code, plan) = iface.plan()?;

            if error_code.is_success() {
                debug!("Plan found in {:.3} s", plan.planning_time_s);
                Ok(SynthesisResult {
                    motion: Some(Motion::Plan(plan)),
                    fraction: None,
                    error_code,
                })
            } else {
                warn!(
                    "Planning to named target \"{}\" failed: {}",
                    goal.state, error_code
                );
                Ok(SynthesisResult {
                    motion: None,
                    fraction: None,
                    error_code,
                })
            }
        }
        GoalKind::WaypointSequence => {
            debug!(
                "Computing Cartesian path through {} waypoints",
                goal.pose_array.len()
            );

            let path = iface.compute_cartesian_path(
                &goal.pose_array,
                params.eef_step_m,
                params.waypoint_jump_threshold,
                params.avoid_collisions,
                None,
            )?;

            Ok(cartesian_result(path.trajectory, path.fraction, path.error_code))
        }
        GoalKind::Destination => {
            debug!(
                "Computing constrained Cartesian path to [{:.3}, {:.3}, {:.3}]",
                goal.destination.position_m.x,
                goal.destination.position_m.y,
                goal.destination.position_m.z
            );

            let path = iface.compute_cartesian_path(
                &[goal.destination],
                params.eef_step_m,
                params.dest_jump_threshold,
                params.avoid_collisions,
                Some(constraints.clone()),
            )?;

            Ok(cartesian_result(path.trajectory, path.fraction, path.error_code))
        }
    }
}

fn cartesian_result(
    trajectory: RobotTrajectory,
    fraction: f64,
    error_code: ErrorCode,
) -> SynthesisResult {
    if is_full_path(fraction) {
        debug!("Cartesian path complete");
    } else {
        warn!(
            "Cartesian path incomplete: {:.2}% achieved, status {}",
            fraction * 100.0,
            error_code
        );
    }

    SynthesisResult {
        motion: Some(Motion::Trajectory(trajectory)),
        fraction: Some(fraction),
        error_code,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
