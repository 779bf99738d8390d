//! # Goal lifecycle
//!
//! Drives a single accepted goal from dispatch to its terminal outcome:
//!
//! ```text
//! Dispatched -> Configuring -> Synthesizing -> CancelCheck1 -> Executing -> CancelCheck2 -> Terminal
//! ```
//!
//! Cancellation is cooperative. The flag on the [`GoalHandle`] is polled at three checkpoints:
//! before synthesis, after synthesis (`CancelCheck1`) and after execution (`CancelCheck2`). A
//! cancellation arriving during a blocking call is observed at the next checkpoint.
//!
//! Every path through [`run_goal`] writes exactly one terminal outcome.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use comms_if::goal::GoalState;
use log::{debug, error, info, warn};

use super::{GoalHandle, GoalKind, Termination};
use crate::{
    move_iface::{MoveIfaceError, MoveInterface},
    planning::{
        exec, synth, PlannerCfgParams, PlanningConfig, PlanningSession, SessionGate,
        SessionGateError,
    },
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State shared by every goal worker.
pub struct GoalContext {
    /// The planning session. Holding the lock means owning the session for one goal.
    session: Mutex<SessionGate>,

    params: PlannerCfgParams,

    /// Cleared when the executable shuts down.
    operational: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Points in the lifecycle at which cancellation is observed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    PreSynthesis,
    PostSynthesis,
    PostExecution,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Session(#[from] SessionGateError),

    #[error("Planning service failure: {0}")]
    Iface(#[from] MoveIfaceError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalContext {
    pub fn new(gate: SessionGate, params: PlannerCfgParams) -> Self {
        Self {
            session: Mutex::new(gate),
            params,
            operational: AtomicBool::new(true),
        }
    }

    pub fn params(&self) -> &PlannerCfgParams {
        &self.params
    }

    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::SeqCst)
    }

    pub fn set_operational(&self, operational: bool) {
        self.operational.store(operational, Ordering::SeqCst);
    }

    /// Lock the planning session.
    ///
    /// If a worker panicked while holding the session its state is unknown, so the session is
    /// dropped and will be re-created by the next goal.
    fn lock_session(&self) -> MutexGuard<'_, SessionGate> {
        match self.session.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Planning session lock was poisoned, resetting the session");
                let mut gate = poisoned.into_inner();
                gate.reset();
                self.session.clear_poison();
                gate
            }
        }
    }
}

impl Checkpoint {
    fn state(&self) -> Option<GoalState> {
        match self {
            Checkpoint::PreSynthesis => None,
            Checkpoint::PostSynthesis => Some(GoalState::CancelCheck1),
            Checkpoint::PostExecution => Some(GoalState::CancelCheck2),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Checkpoint::PreSynthesis => "before synthesis",
            Checkpoint::PostSynthesis => "before execution",
            Checkpoint::PostExecution => "after execution",
        }
    }
}

impl LifecycleError {
    /// Returns true if the error leaves the connection to the service in an unknown state.
    fn is_connection_fault(&self) -> bool {
        match self {
            LifecycleError::Iface(e) => e.is_connection_fault(),
            LifecycleError::Session(_) => false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run a goal to completion and write its terminal outcome.
///
/// Goals are serialised on the planning session, a goal dispatched while another is live waits
/// here until the session is free.
pub fn run_goal(handle: &GoalHandle, ctx: &GoalContext) {
    handle.set_state(GoalState::Dispatched);

    // Safety net, classification never dispatches a goal without a payload
    let termination = if GoalKind::from_goal(handle.goal()) != Some(handle.kind()) {
        error!(
            "Goal {} does not carry a {} payload",
            handle.id(),
            handle.kind().name()
        );
        Termination::aborted(None, "Invalid goal")
    } else {
        let mut gate = ctx.lock_session();

        match run_in_session(handle, &mut gate, ctx) {
            Ok(t) => t,
            Err(e) => {
                error!("Goal {} failed: {}", handle.id(), e);

                if e.is_connection_fault() {
                    gate.reset();
                }

                Termination::aborted(None, e.to_string())
            }
        }
    };

    if let Err(e) = handle.finish(termination) {
        error!("{}", e);
    }
}

/// Initialise the session if needed and drive the goal through it.
fn run_in_session(
    handle: &GoalHandle,
    gate: &mut SessionGate,
    ctx: &GoalContext,
) -> Result<Termination, LifecycleError> {
    let session = gate.get_or_init(&ctx.params)?;

    drive_goal(handle, session, ctx).map_err(|e| {
        // Never leave the robot moving on a failure path
        if let Err(stop_err) = session.iface().stop() {
            error!("Could not stop after failure: {}", stop_err);
        }

        LifecycleError::Iface(e)
    })
}

/// Configure, synthesise and execute the goal.
fn drive_goal(
    handle: &GoalHandle,
    session: &mut PlanningSession,
    ctx: &GoalContext,
) -> Result<Termination, MoveIfaceError> {
    let goal = handle.goal();
    let kind = handle.kind();

    info!("Starting {} goal {}", kind.name(), handle.id());

    // ---- CONFIGURE ----
    handle.set_state(GoalState::Configuring);

    let config = PlanningConfig::for_goal(
        goal,
        kind,
        session.planning_frame(),
        session.eef_link(),
        &ctx.params,
    );
    config.apply(session.iface())?;

    if let Some(t) = checkpoint(handle, session.iface(), Checkpoint::PreSynthesis)? {
        return Ok(t);
    }

    // ---- SYNTHESISE ----
    handle.set_state(GoalState::Synthesizing);

    let synthesis = synth::synthesise(
        session.iface(),
        goal,
        kind,
        &config.constraints,
        &ctx.params,
    )?;

    // Cancellation takes precedence over a synthesis failure
    if let Some(t) = checkpoint(handle, session.iface(), Checkpoint::PostSynthesis)? {
        return Ok(t);
    }

    let operational = ctx.is_operational();
    let executable = synthesis.is_executable(operational);
    let motion = match synthesis.motion {
        Some(m) if executable => m,
        _ => {
            let message = if !operational {
                String::from("Shutting down")
            } else {
                match synthesis.fraction {
                    Some(f) => format!("Cartesian path only {:.1}% achieved", f * 100.0),
                    None => format!("Planning to \"{}\" failed", goal.state),
                }
            };

            return exec::stop_and_abort(session.iface(), Some(synthesis.error_code), message);
        }
    };

    // ---- EXECUTE ----
    handle.set_state(GoalState::Executing);

    let status = exec::execute(session.iface(), &motion)?;

    if let Some(t) = checkpoint(handle, session.iface(), Checkpoint::PostExecution)? {
        return Ok(t);
    }

    exec::conclude(session.iface(), status, ctx.is_operational())
}

/// Observe the cancellation flag at a checkpoint.
///
/// Returns the canceled termination, after stopping the robot, if cancellation was requested.
fn checkpoint(
    handle: &GoalHandle,
    iface: &mut dyn MoveInterface,
    checkpoint: Checkpoint,
) -> Result<Option<Termination>, MoveIfaceError> {
    if let Some(state) = checkpoint.state() {
        handle.set_state(state);
    }

    if !handle.is_canceling() {
        return Ok(None);
    }

    debug!(
        "Goal {} cancellation observed {}",
        handle.id(),
        checkpoint.describe()
    );

    exec::stop_and_cancel(iface, format!("Canceled {}", checkpoint.describe())).map(Some)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        move_iface::MockMoveInterface,
        planning::session::test::{connector_for, expect_session_init},
    };
    use comms_if::{
        eqpt::{
            geom::Pose,
            planner::{CartesianPath, ErrorCode, MotionPlan, RobotTrajectory},
        },
        goal::{GoalEvent, GoalId, GoalOutcome, MotionGoal},
    };
    use std::{
        sync::{
            mpsc::{channel, Receiver},
            Arc,
        },
        thread,
    };

    /// Allow any planner configuration on a mock.
    pub(crate) fn expect_any_config(mock: &mut MockMoveInterface) {
        mock.expect_set_max_velocity_scaling().returning(|_| Ok(()));
        mock.expect_set_max_acceleration_scaling()
            .returning(|_| Ok(()));
        mock.expect_set_planning_time().returning(|_| Ok(()));
        mock.expect_set_planner_id().returning(|_| Ok(()));
        mock.expect_set_num_planning_attempts().returning(|_| Ok(()));
        mock.expect_set_path_constraints().returning(|_| Ok(()));
    }

    /// A mock with session initialisation and configuration expectations already set.
    pub(crate) fn configured_mock() -> MockMoveInterface {
        let mut mock = MockMoveInterface::new();
        expect_session_init(&mut mock);
        expect_any_config(&mut mock);
        mock
    }

    fn full_path() -> CartesianPath {
        CartesianPath {
            trajectory: RobotTrajectory::default(),
            fraction: 1.0,
            error_code: ErrorCode::SUCCESS,
        }
    }

    fn context(mock: MockMoveInterface) -> GoalContext {
        GoalContext::new(
            SessionGate::new(connector_for(mock)),
            PlannerCfgParams::default(),
        )
    }

    fn handle_for(goal: MotionGoal) -> (Arc<GoalHandle>, Receiver<GoalEvent>) {
        let (tx, rx) = channel();
        let kind = GoalKind::from_goal(&goal).unwrap_or(GoalKind::Destination);
        (Arc::new(GoalHandle::new(GoalId(1), goal, kind, tx)), rx)
    }

    fn single_event(rx: &Receiver<GoalEvent>) -> GoalEvent {
        let events: Vec<GoalEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1, "expected exactly one terminal event");
        events.into_iter().next().unwrap()
    }

    fn waypoints() -> Vec<Pose> {
        vec![
            Pose::from_position(0.4, 0.1, 0.5),
            Pose::from_position(0.4, 0.2, 0.5),
        ]
    }

    #[test]
    fn test_named_target_succeeds() {
        let mut mock = configured_mock();
        mock.expect_set_named_target()
            .withf(|n| n == "home")
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_plan()
            .times(1)
            .returning(|| Ok((ErrorCode::SUCCESS, MotionPlan::default())));
        mock.expect_execute()
            .withf(|m| matches!(m, comms_if::eqpt::planner::Motion::Plan(_)))
            .times(1)
            .returning(|_| Ok(ErrorCode::SUCCESS));
        mock.expect_stop().never();

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            state: String::from("home"),
            velocity: 0.5,
            acceleration: 0.5,
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        let event = single_event(&rx);
        assert_eq!(event.outcome, GoalOutcome::Succeeded);
        assert!(event.result.success);
        assert_eq!(handle.state(), GoalState::Terminal(GoalOutcome::Succeeded));
    }

    #[test]
    fn test_named_target_failure_aborts() {
        let mut mock = configured_mock();
        mock.expect_set_named_target().returning(|_| Ok(()));
        mock.expect_plan()
            .returning(|| Ok((ErrorCode::NO_IK_SOLUTION, MotionPlan::default())));
        mock.expect_execute().never();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            state: String::from("unreachable"),
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        let event = single_event(&rx);
        assert_eq!(event.outcome, GoalOutcome::Aborted);
        assert!(!event.result.success);
        assert_eq!(event.error_code, Some(ErrorCode::NO_IK_SOLUTION));
    }

    #[test]
    fn test_waypoints_succeed() {
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path()
            .withf(|wps, _, jump, _, c| wps.len() == 2 && *jump == 0.0 && c.is_none())
            .times(1)
            .returning(|_, _, _, _, _| Ok(full_path()));
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(ErrorCode::SUCCESS));
        mock.expect_stop().never();

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            pose_array: waypoints(),
            velocity: 0.3,
            acceleration: 0.3,
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Succeeded);
    }

    #[test]
    fn test_partial_path_aborts_without_executing() {
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path()
            .returning(|_, _, _, _, _| {
                Ok(CartesianPath {
                    fraction: 0.6,
                    ..full_path()
                })
            });
        mock.expect_execute().never();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            pose_array: waypoints(),
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        let event = single_event(&rx);
        assert_eq!(event.outcome, GoalOutcome::Aborted);
        assert!(!event.result.success);
    }

    #[test]
    fn test_cancel_observed_after_synthesis() {
        let (handle, rx) = handle_for(MotionGoal {
            destination: Pose::from_position(1.0, 2.0, 3.0),
            ..Default::default()
        });

        // The cancel request arrives while the path is being computed
        let handle_clone = handle.clone();
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path()
            .withf(|wps, _, jump, _, c| wps.len() == 1 && *jump == 0.05 && c.is_some())
            .times(1)
            .returning(move |_, _, _, _, _| {
                handle_clone.request_cancel();
                Ok(full_path())
            });
        mock.expect_execute().never();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        run_goal(&handle, &ctx);

        let event = single_event(&rx);
        assert_eq!(event.outcome, GoalOutcome::Canceled);
        assert!(!event.result.success);
    }

    #[test]
    fn test_cancel_before_synthesis() {
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path().never();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            pose_array: waypoints(),
            ..Default::default()
        });

        // Repeated requests behave as one
        handle.request_cancel();
        handle.request_cancel();
        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Canceled);
    }

    #[test]
    fn test_cancel_during_execution() {
        let (handle, rx) = handle_for(MotionGoal {
            pose_array: waypoints(),
            ..Default::default()
        });

        let handle_clone = handle.clone();
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path()
            .returning(|_, _, _, _, _| Ok(full_path()));
        mock.expect_execute().times(1).returning(move |_| {
            handle_clone.request_cancel();
            Ok(ErrorCode::SUCCESS)
        });
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Canceled);
    }

    #[test]
    fn test_transport_failure_aborts_and_resets_session() {
        let mut mock = configured_mock();
        mock.expect_set_named_target().returning(|_| Ok(()));
        mock.expect_plan()
            .returning(|| Err(MoveIfaceError::Timeout("Plan")));
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        let (handle, rx) = handle_for(MotionGoal {
            state: String::from("home"),
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Aborted);
        assert!(!ctx.lock_session().is_initialised());
    }

    #[test]
    fn test_unavailable_service_aborts() {
        let ctx = GoalContext::new(
            SessionGate::new(Box::new(
                || -> Result<Box<dyn MoveInterface>, MoveIfaceError> {
                    Err(MoveIfaceError::NotConnected)
                },
            )),
            PlannerCfgParams::default(),
        );
        let (handle, rx) = handle_for(MotionGoal {
            state: String::from("home"),
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Aborted);
    }

    #[test]
    fn test_invalid_goal_aborts_without_session() {
        let ctx = GoalContext::new(
            SessionGate::new(Box::new(
                || -> Result<Box<dyn MoveInterface>, MoveIfaceError> {
                    panic!("no connection expected")
                },
            )),
            PlannerCfgParams::default(),
        );
        let (handle, rx) = handle_for(MotionGoal::default());

        run_goal(&handle, &ctx);

        let event = single_event(&rx);
        assert_eq!(event.outcome, GoalOutcome::Aborted);
        assert!(!ctx.lock_session().is_initialised());
    }

    #[test]
    fn test_shutdown_aborts_before_execution() {
        let mut mock = configured_mock();
        mock.expect_compute_cartesian_path()
            .returning(|_, _, _, _, _| Ok(full_path()));
        mock.expect_execute().never();
        mock.expect_stop().times(1).returning(|| Ok(()));

        let ctx = context(mock);
        ctx.set_operational(false);
        let (handle, rx) = handle_for(MotionGoal {
            pose_array: waypoints(),
            ..Default::default()
        });

        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Aborted);
    }

    #[test]
    fn test_poisoned_session_recovers() {
        let ctx = Arc::new(GoalContext::new(
            SessionGate::new(Box::new(|| -> Result<Box<dyn MoveInterface>, MoveIfaceError> {
                let mut mock = configured_mock();
                mock.expect_set_named_target().returning(|_| Ok(()));
                mock.expect_plan()
                    .returning(|| Ok((ErrorCode::SUCCESS, MotionPlan::default())));
                mock.expect_execute().returning(|_| Ok(ErrorCode::SUCCESS));
                Ok(Box::new(mock) as Box<dyn MoveInterface>)
            })),
            PlannerCfgParams::default(),
        ));

        // Poison the lock
        let ctx_clone = ctx.clone();
        let res = thread::spawn(move || {
            let _gate = ctx_clone.session.lock().unwrap();
            panic!("worker failure");
        })
        .join();
        assert!(res.is_err());
        assert!(ctx.session.is_poisoned());

        let (handle, rx) = handle_for(MotionGoal {
            state: String::from("home"),
            ..Default::default()
        });
        run_goal(&handle, &ctx);

        assert_eq!(single_event(&rx).outcome, GoalOutcome::Succeeded);
        assert!(!ctx.session.is_poisoned());
    }
}
