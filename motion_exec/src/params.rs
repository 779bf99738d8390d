//! # Motion Executable Parameters
//!
//! This module provides parameters for the motion executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{obstacle::ObstacleParams, planning::PlannerCfgParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionExecParams {
    /// Minimum level of log records, at least `info`.
    pub log_level: String,

    /// Target period of one main loop cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Time to wait for any single response from the planning service, including the end of an
    /// execution.
    ///
    /// Units: milliseconds
    pub planner_timeout_ms: i32,

    /// Number of finished goals whose status can still be queried.
    pub finished_goal_records: usize,

    pub obstacle: ObstacleParams,

    pub planner: PlannerCfgParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MotionExecParams {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            cycle_period_s: 0.05,
            planner_timeout_ms: 120_000,
            finished_goal_records: 64,
            obstacle: ObstacleParams::default(),
            planner: PlannerCfgParams::default(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file() {
        let params: MotionExecParams = util::params::parse(
            r#"
            log_level = "debug"

            [planner]
            planning_time_s = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(params.log_level, "debug");
        assert_eq!(params.cycle_period_s, 0.05);
        assert_eq!(params.planner.planning_time_s, 5.0);
        assert_eq!(params.planner.dest_planning_attempts, 10);
        assert_eq!(params.obstacle.object_id, "surface_mesh");
    }
}
