//! # Goal classification
//!
//! Decides, before anything is dispatched, what kind of motion a goal asks for and whether it is
//! accepted at all. A goal that carries no recognised payload is rejected here and never reaches
//! the planning service.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{eqpt::geom::Pose, goal::MotionGoal};
use log::debug;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The payload kind of a goal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GoalKind {
    /// Move to a predefined, named robot state.
    NamedTarget,

    /// Follow a Cartesian path through an ordered sequence of poses.
    WaypointSequence,

    /// Move to a single Cartesian destination under path constraints.
    Destination,
}

/// Intake decision for a goal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GoalDecision {
    /// Accept the goal and start executing it straight away.
    AcceptAndExecute(GoalKind),

    /// Accept the goal, execution starts once it has been dispatched.
    AcceptAndDefer(GoalKind),

    Reject,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalKind {
    /// Determine the kind of a goal.
    ///
    /// Payloads are checked in a fixed priority order, named target first, then waypoint
    /// sequence, then destination. Returns `None` if no payload is populated.
    pub fn from_goal(goal: &MotionGoal) -> Option<Self> {
        if !goal.state.is_empty() {
            Some(GoalKind::NamedTarget)
        } else if !goal.pose_array.is_empty() {
            Some(GoalKind::WaypointSequence)
        } else if has_destination(&goal.destination) {
            Some(GoalKind::Destination)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GoalKind::NamedTarget => "named target",
            GoalKind::WaypointSequence => "waypoint sequence",
            GoalKind::Destination => "destination",
        }
    }
}

impl GoalDecision {
    /// The kind of an accepted goal.
    pub fn kind(&self) -> Option<GoalKind> {
        match self {
            GoalDecision::AcceptAndExecute(k) | GoalDecision::AcceptAndDefer(k) => Some(*k),
            GoalDecision::Reject => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Classify an incoming goal.
pub fn classify(goal: &MotionGoal) -> GoalDecision {
    let decision = match GoalKind::from_goal(goal) {
        Some(k @ GoalKind::NamedTarget) | Some(k @ GoalKind::WaypointSequence) => {
            GoalDecision::AcceptAndExecute(k)
        }
        Some(k @ GoalKind::Destination) => GoalDecision::AcceptAndDefer(k),
        None => GoalDecision::Reject,
    };

    match decision.kind() {
        Some(k) => debug!("Goal classified as {}", k.name()),
        None => debug!("Goal has no recognised payload"),
    }

    decision
}

/// Returns true if the destination pose is populated.
///
/// A destination counts as present only if all three position coordinates are non-zero. A
/// destination with any coordinate exactly zero cannot be told apart from an absent one.
pub fn has_destination(destination: &Pose) -> bool {
    destination.position_m.iter().all(|c| *c != 0.0)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut goal = MotionGoal {
            state: String::from("home"),
            pose_array: vec![Pose::from_position(0.1, 0.2, 0.3)],
            destination: Pose::from_position(1.0, 2.0, 3.0),
            ..Default::default()
        };
        assert_eq!(
            classify(&goal),
            GoalDecision::AcceptAndExecute(GoalKind::NamedTarget)
        );

        goal.state.clear();
        assert_eq!(
            classify(&goal),
            GoalDecision::AcceptAndExecute(GoalKind::WaypointSequence)
        );

        goal.pose_array.clear();
        assert_eq!(
            classify(&goal),
            GoalDecision::AcceptAndDefer(GoalKind::Destination)
        );
    }

    #[test]
    fn test_reject_empty() {
        let decision = classify(&MotionGoal::default());
        assert_eq!(decision, GoalDecision::Reject);
        assert!(decision.kind().is_none());
    }

    #[test]
    fn test_zero_coordinate_destination_rejected() {
        for pos in [[0.0, 2.0, 3.0], [1.0, 0.0, 3.0], [1.0, 2.0, 0.0]].iter() {
            let goal = MotionGoal {
                destination: Pose::from_position(pos[0], pos[1], pos[2]),
                velocity: 0.5,
                acceleration: 0.5,
                ..Default::default()
            };
            assert_eq!(classify(&goal), GoalDecision::Reject);
        }

        assert!(has_destination(&Pose::from_position(-1.0, 0.5, 1e-9)));
    }
}
