//! # Planner configuration
//!
//! Before every synthesis the planning session is configured as a pure function of the goal and
//! its kind. The configuration is first computed into a [`PlanningConfig`], which can be
//! inspected, and then applied to the session in a fixed order.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{
        geom::Pose,
        planner::{Constraints, OrientationConstraint, PositionConstraint},
    },
    goal::MotionGoal,
};
use log::debug;

use super::PlannerCfgParams;
use crate::{
    goal_mgr::GoalKind,
    move_iface::{MoveIfaceError, MoveInterface},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Planner settings for a single goal.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConfig {
    pub velocity_scaling: f64,

    pub acceleration_scaling: f64,

    /// Units: seconds
    pub planning_time_s: f64,

    /// Planner algorithm and number of attempts, `None` keeps the service's current choice.
    pub planner: Option<PlannerSelection>,

    /// Path constraints for this goal. An empty set clears any constraint left from a previous
    /// goal.
    pub constraints: Constraints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSelection {
    pub planner_id: String,
    pub attempts: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlanningConfig {
    /// Compute the configuration for a goal.
    ///
    /// Destination goals use fixed velocity and acceleration scaling from the parameters,
    /// overriding the goal's own values, a fixed planner and a pair of path constraints around
    /// the destination.
    pub fn for_goal(
        goal: &MotionGoal,
        kind: GoalKind,
        planning_frame: &str,
        eef_link: &str,
        params: &PlannerCfgParams,
    ) -> Self {
        match kind {
            GoalKind::NamedTarget | GoalKind::WaypointSequence => Self {
                velocity_scaling: goal.velocity,
                acceleration_scaling: goal.acceleration,
                planning_time_s: params.planning_time_s,
                planner: None,
                constraints: Constraints::default(),
            },
            GoalKind::Destination => Self {
                velocity_scaling: params.dest_velocity_scaling,
                acceleration_scaling: params.dest_acceleration_scaling,
                planning_time_s: params.planning_time_s,
                planner: Some(PlannerSelection {
                    planner_id: params.dest_planner_id.clone(),
                    attempts: params.dest_planning_attempts,
                }),
                constraints: destination_constraints(
                    &goal.destination,
                    planning_frame,
                    eef_link,
                    params,
                ),
            },
        }
    }

    /// Apply the configuration to the planning session.
    ///
    /// Every call must succeed before synthesis may start, the first failure is returned.
    pub fn apply(&self, iface: &mut dyn MoveInterface) -> Result<(), MoveIfaceError> {
        debug!(
            "Configuring planner: velocity {}, acceleration {}, planning time {} s",
            self.velocity_scaling, self.acceleration_scaling, self.planning_time_s
        );

        iface.set_max_velocity_scaling(self.velocity_scaling)?;
        iface.set_max_acceleration_scaling(self.acceleration_scaling)?;
        iface.set_planning_time(self.planning_time_s)?;

        if let Some(ref planner) = self.planner {
            debug!(
                "Using planner {} with {} attempts",
                planner.planner_id, planner.attempts
            );
            iface.set_planner_id(&planner.planner_id)?;
            iface.set_num_planning_attempts(planner.attempts)?;
        }

        // Constraints are always replaced, never merged
        iface.set_path_constraints(self.constraints.clone())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the position and orientation constraints which keep the end effector close to
/// `target`.
pub fn destination_constraints(
    target: &Pose,
    planning_frame: &str,
    eef_link: &str,
    params: &PlannerCfgParams,
) -> Constraints {
    let position = PositionConstraint {
        link_name: eef_link.into(),
        frame_id: planning_frame.into(),
        center_m: target.position_m,
        radius_m: params.dest_position_tolerance_m,
        weight: params.constraint_weight,
    };

    let orientation = OrientationConstraint {
        link_name: eef_link.into(),
        frame_id: planning_frame.into(),
        orientation_q: target.orientation_q,
        abs_x_axis_tolerance_rad: params.dest_orientation_tolerance_rad,
        abs_y_axis_tolerance_rad: params.dest_orientation_tolerance_rad,
        abs_z_axis_tolerance_rad: params.dest_orientation_tolerance_rad,
        weight: params.constraint_weight,
    };

    Constraints {
        position_constraints: vec![position],
        orientation_constraints: vec![orientation],
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::move_iface::MockMoveInterface;
    use mockall::{predicate::eq, Sequence};

    fn dest_goal(x: f64, y: f64, z: f64) -> MotionGoal {
        MotionGoal {
            destination: Pose::new([x, y, z], [0.0, 0.0, 0.7071, 0.7071]),
            velocity: 0.9,
            acceleration: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_destination_config() {
        let params = PlannerCfgParams::default();
        let goal = dest_goal(1.0, 2.0, 3.0);
        let config = PlanningConfig::for_goal(&goal, GoalKind::Destination, "world", "tool0", &params);

        // Goal scaling is overridden
        assert_eq!(config.velocity_scaling, 0.1);
        assert_eq!(config.acceleration_scaling, 0.2);
        assert_eq!(config.planning_time_s, 10.0);
        assert_eq!(
            config.planner,
            Some(PlannerSelection {
                planner_id: String::from("RRTConnectkConfigDefault"),
                attempts: 10
            })
        );

        // Exactly one constraint of each kind, on the target
        let c = &config.constraints;
        assert_eq!(c.position_constraints.len(), 1);
        assert_eq!(c.orientation_constraints.len(), 1);

        let pos = &c.position_constraints[0];
        assert_eq!(pos.radius_m, 0.01);
        assert_eq!(pos.center_m, goal.destination.position_m);
        assert_eq!(pos.link_name, "tool0");
        assert_eq!(pos.frame_id, "world");
        assert_eq!(pos.weight, 1.0);

        let ori = &c.orientation_constraints[0];
        assert_eq!(ori.orientation_q, goal.destination.orientation_q);
        assert_eq!(ori.abs_x_axis_tolerance_rad, 0.01);
        assert_eq!(ori.abs_y_axis_tolerance_rad, 0.01);
        assert_eq!(ori.abs_z_axis_tolerance_rad, 0.01);
        assert_eq!(ori.weight, 1.0);
    }

    #[test]
    fn test_other_kinds_use_goal_scaling() {
        let params = PlannerCfgParams::default();
        let goal = MotionGoal {
            state: String::from("home"),
            velocity: 0.5,
            acceleration: 0.25,
            ..Default::default()
        };

        for kind in [GoalKind::NamedTarget, GoalKind::WaypointSequence].iter() {
            let config = PlanningConfig::for_goal(&goal, *kind, "world", "tool0", &params);
            assert_eq!(config.velocity_scaling, 0.5);
            assert_eq!(config.acceleration_scaling, 0.25);
            assert_eq!(config.planning_time_s, 10.0);
            assert!(config.planner.is_none());
            assert!(config.constraints.is_empty());
        }
    }

    #[test]
    fn test_constraints_do_not_leak() {
        let params = PlannerCfgParams::default();
        let first = PlanningConfig::for_goal(
            &dest_goal(1.0, 2.0, 3.0),
            GoalKind::Destination,
            "world",
            "tool0",
            &params,
        );
        let second = PlanningConfig::for_goal(
            &dest_goal(-1.0, 0.5, 0.25),
            GoalKind::Destination,
            "world",
            "tool0",
            &params,
        );
        let third = PlanningConfig::for_goal(
            &MotionGoal {
                pose_array: vec![Pose::from_position(0.1, 0.1, 0.1)],
                ..Default::default()
            },
            GoalKind::WaypointSequence,
            "world",
            "tool0",
            &params,
        );

        let applied = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let applied_clone = applied.clone();

        let mut mock = MockMoveInterface::new();
        mock.expect_set_max_velocity_scaling().returning(|_| Ok(()));
        mock.expect_set_max_acceleration_scaling()
            .returning(|_| Ok(()));
        mock.expect_set_planning_time().returning(|_| Ok(()));
        mock.expect_set_planner_id().returning(|_| Ok(()));
        mock.expect_set_num_planning_attempts().returning(|_| Ok(()));
        mock.expect_set_path_constraints()
            .times(3)
            .returning(move |c| {
                applied_clone.lock().unwrap().push(c);
                Ok(())
            });

        first.apply(&mut mock).unwrap();
        second.apply(&mut mock).unwrap();
        third.apply(&mut mock).unwrap();

        let applied = applied.lock().unwrap();

        // The second goal's constraints replace the first's entirely
        assert_eq!(applied[1].position_constraints.len(), 1);
        assert_eq!(
            applied[1].position_constraints[0].center_m,
            second.constraints.position_constraints[0].center_m
        );

        // A waypoint goal clears them
        assert!(applied[2].is_empty());
    }

    #[test]
    fn test_apply_order() {
        let params = PlannerCfgParams::default();
        let config = PlanningConfig::for_goal(
            &dest_goal(1.0, 2.0, 3.0),
            GoalKind::Destination,
            "world",
            "tool0",
            &params,
        );

        let mut seq = Sequence::new();
        let mut mock = MockMoveInterface::new();
        mock.expect_set_max_velocity_scaling()
            .with(eq(0.1))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_max_acceleration_scaling()
            .with(eq(0.2))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_planning_time()
            .with(eq(10.0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_planner_id()
            .withf(|id| id == "RRTConnectkConfigDefault")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_num_planning_attempts()
            .with(eq(10))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_set_path_constraints()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        config.apply(&mut mock).unwrap();
    }

    #[test]
    fn test_apply_stops_at_first_failure() {
        let config = PlanningConfig::for_goal(
            &MotionGoal {
                state: String::from("home"),
                ..Default::default()
            },
            GoalKind::NamedTarget,
            "world",
            "tool0",
            &PlannerCfgParams::default(),
        );

        let mut mock = MockMoveInterface::new();
        mock.expect_set_max_velocity_scaling()
            .returning(|_| Err(MoveIfaceError::NotConnected));
        mock.expect_set_path_constraints().never();

        assert_eq!(config.apply(&mut mock), Err(MoveIfaceError::NotConnected));
    }
}
