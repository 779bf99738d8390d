//! # Planner Equipment Communications Module
//!
//! Commands and responses exchanged with the planning/execution service. The service owns the
//! kinematics, the trajectory computation and the joint-level execution; the motion executable
//! only drives it through the commands defined here.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::{geom::Pose, scene::CollisionObject};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Numeric status code reported by the planning service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

/// A single point along a joint trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Joint positions, in the order of [`RobotTrajectory::joint_names`].
    ///
    /// Units: radians or meters depending on the joint type
    pub positions: Vec<f64>,

    /// Joint velocities, may be empty.
    pub velocities: Vec<f64>,

    /// Time at which this point is reached, relative to the start of the trajectory.
    ///
    /// Units: seconds
    pub time_from_start_s: f64,
}

/// A joint-space trajectory computed by the planning service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

/// The result of a free (named target) planning request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    pub trajectory: RobotTrajectory,

    /// Time the service spent planning.
    ///
    /// Units: seconds
    pub planning_time_s: f64,
}

/// The result of a Cartesian path computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianPath {
    pub trajectory: RobotTrajectory,

    /// Fraction of the requested path that was achieved, in `[0, 1]`.
    pub fraction: f64,

    pub error_code: ErrorCode,
}

/// Restricts the end effector to a sphere around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionConstraint {
    pub link_name: String,
    pub frame_id: String,

    /// Centre of the allowed region in `frame_id`.
    ///
    /// Units: meters
    pub center_m: Vector3<f64>,

    /// Radius of the allowed region.
    ///
    /// Units: meters
    pub radius_m: f64,

    pub weight: f64,
}

/// Restricts the end effector orientation to within per-axis tolerances of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationConstraint {
    pub link_name: String,
    pub frame_id: String,
    pub orientation_q: Quaternion<f64>,

    /// Units: radians
    pub abs_x_axis_tolerance_rad: f64,

    /// Units: radians
    pub abs_y_axis_tolerance_rad: f64,

    /// Units: radians
    pub abs_z_axis_tolerance_rad: f64,

    pub weight: f64,
}

/// The set of path constraints active on the planning service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub position_constraints: Vec<PositionConstraint>,
    pub orientation_constraints: Vec<OrientationConstraint>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Something the service can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Motion {
    Plan(MotionPlan),
    Trajectory(RobotTrajectory),
}

/// Commands that can be sent to the planning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlannerCmd {
    SetNamedTarget(String),
    Plan,
    ComputeCartesianPath {
        waypoints: Vec<Pose>,
        eef_step_m: f64,
        jump_threshold: f64,
        avoid_collisions: bool,
        constraints: Option<Constraints>,
    },
    Execute(Motion),
    Stop,
    GetCurrentPose,
    GetPlanningFrame,
    GetEndEffectorLink,
    SetMaxVelocityScaling(f64),
    SetMaxAccelerationScaling(f64),
    SetPlanningTime(f64),
    SetPlannerId(String),
    SetNumPlanningAttempts(u32),
    SetPathConstraints(Constraints),
    SetGoalTolerance(f64),
    SetPoseReferenceFrame(String),
    ApplyCollisionObject(CollisionObject),
}

/// Responses from the planning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlannerRep {
    /// Command accepted, nothing to return.
    Ok,

    /// Status of a plan or execute command.
    Status(ErrorCode),

    /// Result of a plan command.
    Plan { error_code: ErrorCode, plan: MotionPlan },

    /// Result of a Cartesian path command.
    CartesianPath(CartesianPath),

    /// Current end effector pose.
    Pose(Pose),

    /// Planning frame or end effector link name.
    Name(String),

    /// The service could not process the command.
    Error(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(1);
    pub const FAILURE: ErrorCode = ErrorCode(99999);
    pub const PLANNING_FAILED: ErrorCode = ErrorCode(-1);
    pub const INVALID_MOTION_PLAN: ErrorCode = ErrorCode(-2);
    pub const MOTION_PLAN_INVALIDATED_BY_ENVIRONMENT_CHANGE: ErrorCode = ErrorCode(-3);
    pub const CONTROL_FAILED: ErrorCode = ErrorCode(-4);
    pub const UNABLE_TO_AQUIRE_SENSOR_DATA: ErrorCode = ErrorCode(-5);
    pub const TIMED_OUT: ErrorCode = ErrorCode(-6);
    pub const PREEMPTED: ErrorCode = ErrorCode(-7);
    pub const START_STATE_IN_COLLISION: ErrorCode = ErrorCode(-10);
    pub const GOAL_IN_COLLISION: ErrorCode = ErrorCode(-12);
    pub const INVALID_GOAL_CONSTRAINTS: ErrorCode = ErrorCode(-16);
    pub const FRAME_TRANSFORM_FAILURE: ErrorCode = ErrorCode(-21);
    pub const NO_IK_SOLUTION: ErrorCode = ErrorCode(-31);

    /// Returns true if the code indicates success.
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Get the name of a known code.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::SUCCESS => "SUCCESS",
            Self::FAILURE => "FAILURE",
            Self::PLANNING_FAILED => "PLANNING_FAILED",
            Self::INVALID_MOTION_PLAN => "INVALID_MOTION_PLAN",
            Self::MOTION_PLAN_INVALIDATED_BY_ENVIRONMENT_CHANGE => {
                "MOTION_PLAN_INVALIDATED_BY_ENVIRONMENT_CHANGE"
            }
            Self::CONTROL_FAILED => "CONTROL_FAILED",
            Self::UNABLE_TO_AQUIRE_SENSOR_DATA => "UNABLE_TO_AQUIRE_SENSOR_DATA",
            Self::TIMED_OUT => "TIMED_OUT",
            Self::PREEMPTED => "PREEMPTED",
            Self::START_STATE_IN_COLLISION => "START_STATE_IN_COLLISION",
            Self::GOAL_IN_COLLISION => "GOAL_IN_COLLISION",
            Self::INVALID_GOAL_CONSTRAINTS => "INVALID_GOAL_CONSTRAINTS",
            Self::FRAME_TRANSFORM_FAILURE => "FRAME_TRANSFORM_FAILURE",
            Self::NO_IK_SOLUTION => "NO_IK_SOLUTION",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(n) => write!(f, "{} ({})", self.0, n),
            None => write!(f, "{}", self.0),
        }
    }
}

impl PlannerCmd {
    /// Name of the command, used in error reports.
    pub fn name(&self) -> &'static str {
        match self {
            PlannerCmd::SetNamedTarget(_) => "SetNamedTarget",
            PlannerCmd::Plan => "Plan",
            PlannerCmd::ComputeCartesianPath { .. } => "ComputeCartesianPath",
            PlannerCmd::Execute(_) => "Execute",
            PlannerCmd::Stop => "Stop",
            PlannerCmd::GetCurrentPose => "GetCurrentPose",
            PlannerCmd::GetPlanningFrame => "GetPlanningFrame",
            PlannerCmd::GetEndEffectorLink => "GetEndEffectorLink",
            PlannerCmd::SetMaxVelocityScaling(_) => "SetMaxVelocityScaling",
            PlannerCmd::SetMaxAccelerationScaling(_) => "SetMaxAccelerationScaling",
            PlannerCmd::SetPlanningTime(_) => "SetPlanningTime",
            PlannerCmd::SetPlannerId(_) => "SetPlannerId",
            PlannerCmd::SetNumPlanningAttempts(_) => "SetNumPlanningAttempts",
            PlannerCmd::SetPathConstraints(_) => "SetPathConstraints",
            PlannerCmd::SetGoalTolerance(_) => "SetGoalTolerance",
            PlannerCmd::SetPoseReferenceFrame(_) => "SetPoseReferenceFrame",
            PlannerCmd::ApplyCollisionObject(_) => "ApplyCollisionObject",
        }
    }
}

impl Motion {
    /// The trajectory which will be executed.
    pub fn trajectory(&self) -> &RobotTrajectory {
        match self {
            Motion::Plan(p) => &p.trajectory,
            Motion::Trajectory(t) => t,
        }
    }
}

impl Constraints {
    /// Returns true if no constraint of any kind is present.
    pub fn is_empty(&self) -> bool {
        self.position_constraints.is_empty() && self.orientation_constraints.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
