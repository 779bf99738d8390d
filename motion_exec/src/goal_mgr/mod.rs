//! # Goal Manager
//!
//! The goal manager is the requester-facing side of the goal lifecycle. It classifies submitted
//! goals, spawns one supervised worker per accepted goal, forwards cancellation requests and
//! answers status queries. None of its operations block on planning or execution.
//!
//! Workers report terminal outcomes through the event channel returned by [`GoalMgr::new`].
//! [`GoalMgr::supervise`] must be called periodically to reap finished workers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
};

use comms_if::goal::{ActionRequest, ActionResponse, GoalEvent, GoalId, GoalStatus, MotionGoal};
use log::{error, info, warn};

use crate::planning::{PlannerCfgParams, SessionGate};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod classify;
mod handle;
mod lifecycle;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use classify::{classify, has_destination, GoalDecision, GoalKind};
pub use handle::{GoalHandle, GoalHandleError, Termination};
pub use lifecycle::{run_goal, Checkpoint, GoalContext, LifecycleError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GoalMgr {
    ctx: Arc<GoalContext>,

    next_id: u64,

    live: BTreeMap<GoalId, LiveGoal>,

    /// Status of recently finished goals, oldest first.
    finished: VecDeque<GoalStatus>,

    max_finished_records: usize,

    event_sender: Sender<GoalEvent>,
}

struct LiveGoal {
    handle: Arc<GoalHandle>,
    worker_jh: JoinHandle<()>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GoalMgrError {
    #[error("Could not spawn a goal worker: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalMgr {
    /// Create a new goal manager.
    ///
    /// The returned receiver yields one [`GoalEvent`] per accepted goal.
    pub fn new(
        gate: SessionGate,
        params: PlannerCfgParams,
        max_finished_records: usize,
    ) -> (Self, Receiver<GoalEvent>) {
        let (event_sender, event_receiver) = channel();

        let mgr = Self {
            ctx: Arc::new(GoalContext::new(gate, params)),
            next_id: 0,
            live: BTreeMap::new(),
            finished: VecDeque::new(),
            max_finished_records,
            event_sender,
        };

        (mgr, event_receiver)
    }

    /// Handle a request from a requester.
    pub fn handle_request(&mut self, request: ActionRequest) -> ActionResponse {
        match request {
            ActionRequest::Submit(goal) => match self.submit(goal) {
                Ok(Some(id)) => ActionResponse::Accepted(id),
                Ok(None) => ActionResponse::Rejected,
                Err(e) => {
                    error!("{}", e);
                    ActionResponse::Rejected
                }
            },
            ActionRequest::Cancel(id) => {
                self.cancel(id);
                ActionResponse::CancelAccepted
            }
            ActionRequest::Status(id) => match self.status(id) {
                Some(s) => ActionResponse::Status(s),
                None => ActionResponse::UnknownGoal,
            },
        }
    }

    /// Submit a new goal.
    ///
    /// Returns the ID of the goal if it was accepted, or `None` if it was rejected. A rejected
    /// goal is never dispatched and never produces a terminal event.
    pub fn submit(&mut self, goal: MotionGoal) -> Result<Option<GoalId>, GoalMgrError> {
        let kind = match classify(&goal).kind() {
            Some(k) => k,
            None => {
                warn!("Rejecting goal with no recognised payload");
                return Ok(None);
            }
        };

        let id = GoalId(self.next_id);

        let handle = Arc::new(GoalHandle::new(
            id,
            goal,
            kind,
            self.event_sender.clone(),
        ));

        let worker_handle = handle.clone();
        let worker_ctx = self.ctx.clone();
        let worker_jh = thread::Builder::new()
            .name(format!("goal_{}", id.0))
            .spawn(move || run_goal(&worker_handle, &worker_ctx))
            .map_err(GoalMgrError::SpawnError)?;

        self.next_id += 1;
        self.live.insert(id, LiveGoal { handle, worker_jh });

        info!("Accepted {} goal {}", kind.name(), id);

        Ok(Some(id))
    }

    /// Request cancellation of a goal.
    ///
    /// Returns true if the goal is live. Cancelling a finished or unknown goal has no effect.
    pub fn cancel(&self, id: GoalId) -> bool {
        match self.live.get(&id) {
            Some(live) => {
                live.handle.request_cancel();
                true
            }
            None => {
                warn!("Cancel requested for goal {} which is not live", id);
                false
            }
        }
    }

    /// Get the status of a live or recently finished goal.
    pub fn status(&self, id: GoalId) -> Option<GoalStatus> {
        match self.live.get(&id) {
            Some(live) => Some(live.handle.status()),
            None => self.finished.iter().find(|s| s.goal_id == id).cloned(),
        }
    }

    /// Number of goals whose workers have not yet been reaped.
    pub fn num_live(&self) -> usize {
        self.live.len()
    }

    /// Reap finished workers.
    ///
    /// A worker which exited without writing an outcome, for example because it panicked, has an
    /// aborted outcome written on its behalf.
    pub fn supervise(&mut self) {
        let done: Vec<GoalId> = self
            .live
            .iter()
            .filter(|(_, live)| live.worker_jh.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in done {
            if let Some(live) = self.live.remove(&id) {
                self.reap(live);
            }
        }
    }

    /// Shut down the manager.
    ///
    /// Marks the system as no longer operational, asks every live goal to cancel and waits for
    /// all workers to exit.
    pub fn shutdown(mut self) {
        self.ctx.set_operational(false);

        for live in self.live.values() {
            live.handle.request_cancel();
        }

        let live = std::mem::take(&mut self.live);
        if !live.is_empty() {
            info!("Waiting for {} goal worker(s) to exit", live.len());
        }

        for (_, l) in live {
            self.reap(l);
        }
    }

    fn reap(&mut self, live: LiveGoal) {
        let id = live.handle.id();

        if live.worker_jh.join().is_err() {
            error!("Worker for goal {} panicked", id);
        }

        if live.handle.outcome().is_none() {
            let term = Termination::aborted(None, "Goal worker exited without an outcome");
            if let Err(e) = live.handle.finish(term) {
                error!("{}", e);
            }
        }

        self.finished.push_back(live.handle.status());
        while self.finished.len() > self.max_finished_records {
            self.finished.pop_front();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
