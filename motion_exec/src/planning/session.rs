//! # Planning session
//!
//! The planning session wraps the move interface of the planning service. It is created lazily by
//! the first goal that needs it and then reused by every following goal for the lifetime of the
//! process. [`SessionGate`] is the one-time initialisation gate in front of it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};

use super::PlannerCfgParams;
use crate::move_iface::{MoveIfaceError, MoveInterface};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Creates a new connection to the planning service.
pub type Connector = Box<dyn FnMut() -> Result<Box<dyn MoveInterface>, MoveIfaceError> + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An initialised planning session.
pub struct PlanningSession {
    iface: Box<dyn MoveInterface>,

    /// Frame in which the service plans and constraints are expressed.
    planning_frame: String,

    /// Link whose pose is the subject of planning and constraints.
    eef_link: String,
}

/// Lazy, one-time initialisation gate for the [`PlanningSession`].
pub struct SessionGate {
    connector: Connector,

    session: Option<PlanningSession>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionGateError {
    #[error("Could not connect to the planning service: {0}")]
    ConnectFailed(MoveIfaceError),

    #[error("Could not initialise the planning session: {0}")]
    InitFailed(MoveIfaceError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlanningSession {
    /// Initialise a session on the given interface.
    ///
    /// Sets the goal tolerance and the pose reference frame, and reads back the planning frame and
    /// end effector link from the service.
    pub fn init(
        mut iface: Box<dyn MoveInterface>,
        params: &PlannerCfgParams,
    ) -> Result<Self, MoveIfaceError> {
        iface.set_goal_tolerance(params.goal_tolerance_m)?;
        iface.set_pose_reference_frame(&params.pose_reference_frame)?;

        let planning_frame = iface.get_planning_frame()?;
        let eef_link = iface.get_end_effector_link()?;

        info!("Planning session initialised");
        info!("    Planning frame: {}", planning_frame);
        info!("    End effector link: {}", eef_link);

        Ok(Self {
            iface,
            planning_frame,
            eef_link,
        })
    }

    /// The move interface of the session.
    pub fn iface(&mut self) -> &mut dyn MoveInterface {
        self.iface.as_mut()
    }

    pub fn planning_frame(&self) -> &str {
        &self.planning_frame
    }

    pub fn eef_link(&self) -> &str {
        &self.eef_link
    }
}

impl SessionGate {
    /// Create a new gate. No connection is made until [`SessionGate::get_or_init`] is first called.
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            session: None,
        }
    }

    /// Get the session, connecting and initialising it first if needed.
    ///
    /// If connecting or initialising fails the gate stays uninitialised and the next call retries.
    pub fn get_or_init(
        &mut self,
        params: &PlannerCfgParams,
    ) -> Result<&mut PlanningSession, SessionGateError> {
        let session = match self.session.take() {
            Some(s) => s,
            None => {
                debug!("Creating planning session");

                let iface = (self.connector)().map_err(SessionGateError::ConnectFailed)?;
                PlanningSession::init(iface, params).map_err(SessionGateError::InitFailed)?
            }
        };

        Ok(self.session.insert(session))
    }

    pub fn is_initialised(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the current session, the next goal will create a new one.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            info!("Planning session reset");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::move_iface::MockMoveInterface;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Add the expectations of session initialisation to a mock.
    pub(crate) fn expect_session_init(mock: &mut MockMoveInterface) {
        mock.expect_set_goal_tolerance()
            .withf(|t| *t == 0.0001)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_pose_reference_frame()
            .withf(|f| f == "world")
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_get_planning_frame()
            .returning(|| Ok(String::from("world")));
        mock.expect_get_end_effector_link()
            .returning(|| Ok(String::from("tool0")));
    }

    /// A connector which hands out the given mock once.
    pub(crate) fn connector_for(mock: MockMoveInterface) -> Connector {
        let mut mock = Some(mock);
        Box::new(move || match mock.take() {
            Some(m) => Ok(Box::new(m) as Box<dyn MoveInterface>),
            None => Err(MoveIfaceError::NotConnected),
        })
    }

    #[test]
    fn test_lazy_init_happens_once() {
        let connects = Arc::new(AtomicUsize::new(0));
        let connects_clone = connects.clone();

        let mut mock = MockMoveInterface::new();
        expect_session_init(&mut mock);
        let mut mock = Some(mock);

        let mut gate = SessionGate::new(Box::new(move || {
            connects_clone.fetch_add(1, Ordering::SeqCst);
            mock.take()
                .map(|m| Box::new(m) as Box<dyn MoveInterface>)
                .ok_or(MoveIfaceError::NotConnected)
        }));

        assert!(!gate.is_initialised());
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        let params = PlannerCfgParams::default();
        {
            let session = gate.get_or_init(&params).unwrap();
            assert_eq!(session.planning_frame(), "world");
            assert_eq!(session.eef_link(), "tool0");
        }
        gate.get_or_init(&params).unwrap();

        assert!(gate.is_initialised());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_retries() {
        let mut gate = SessionGate::new(Box::new(
            || -> Result<Box<dyn MoveInterface>, MoveIfaceError> { Err(MoveIfaceError::NotConnected) },
        ));

        assert!(matches!(
            gate.get_or_init(&PlannerCfgParams::default()),
            Err(SessionGateError::ConnectFailed(MoveIfaceError::NotConnected))
        ));
        assert!(!gate.is_initialised());

        let mut mock = MockMoveInterface::new();
        mock.expect_set_goal_tolerance()
            .returning(|_| Err(MoveIfaceError::Timeout("SetGoalTolerance")));
        let mut gate = SessionGate::new(connector_for(mock));

        assert!(matches!(
            gate.get_or_init(&PlannerCfgParams::default()),
            Err(SessionGateError::InitFailed(_))
        ));
        assert!(!gate.is_initialised());
    }
}
