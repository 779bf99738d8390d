//! Parameters structure for the planning session

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters applied to the planning service.
///
/// Missing entries in the parameter file take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerCfgParams {
    // ---- SESSION ----
    /// Goal tolerance set once when the session is initialised.
    ///
    /// Units: meters
    pub goal_tolerance_m: f64,

    /// Reference frame for all target poses.
    pub pose_reference_frame: String,

    // ---- ALL GOALS ----
    /// Planning time budget for every goal.
    ///
    /// Units: seconds
    pub planning_time_s: f64,

    // ---- DESTINATION GOALS ----
    /// Velocity scaling used for destination goals, overriding the goal's value.
    pub dest_velocity_scaling: f64,

    /// Acceleration scaling used for destination goals, overriding the goal's value.
    pub dest_acceleration_scaling: f64,

    pub dest_planner_id: String,

    pub dest_planning_attempts: u32,

    /// Radius of the position constraint sphere around the destination.
    ///
    /// Units: meters
    pub dest_position_tolerance_m: f64,

    /// Per-axis tolerance of the orientation constraint.
    ///
    /// Units: radians
    pub dest_orientation_tolerance_rad: f64,

    /// Weight of both destination constraints.
    pub constraint_weight: f64,

    // ---- CARTESIAN PATHS ----
    /// Units: meters
    pub eef_step_m: f64,

    /// Jump threshold for waypoint sequences, zero disallows any discontinuity.
    pub waypoint_jump_threshold: f64,

    /// Jump threshold for a single destination.
    pub dest_jump_threshold: f64,

    pub avoid_collisions: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PlannerCfgParams {
    fn default() -> Self {
        Self {
            goal_tolerance_m: 0.0001,
            pose_reference_frame: String::from("world"),
            planning_time_s: 10.0,
            dest_velocity_scaling: 0.1,
            dest_acceleration_scaling: 0.2,
            dest_planner_id: String::from("RRTConnectkConfigDefault"),
            dest_planning_attempts: 10,
            dest_position_tolerance_m: 0.01,
            dest_orientation_tolerance_rad: 0.01,
            constraint_weight: 1.0,
            eef_step_m: 0.01,
            waypoint_jump_threshold: 0.0,
            dest_jump_threshold: 0.05,
            avoid_collisions: true,
        }
    }
}
