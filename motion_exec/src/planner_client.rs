//! # Planner Client
//!
//! The planner client talks to the planning/execution service over a zmq REQ socket. It
//! implements both [`MoveInterface`] and [`PlanningScene`], so each request blocks until the
//! service has answered or the receive timeout has elapsed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{
        geom::Pose,
        planner::{
            CartesianPath, Constraints, ErrorCode, Motion, MotionPlan, PlannerCmd, PlannerRep,
        },
        scene::CollisionObject,
    },
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::{info, trace};

use crate::{
    move_iface::{MoveIfaceError, MoveInterface, PlanningScene},
    planning::Connector,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The planner client
pub struct PlannerClient {
    /// Request-response socket for planner commands and responses
    reqrep: MonitoredSocket,
}

#[derive(Debug, thiserror::Error)]
pub enum PlannerClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlannerClient {
    /// Connect to the planning service.
    ///
    /// `timeout_ms` bounds every request, including execution, so it must be longer than the
    /// longest expected motion.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        timeout_ms: i32,
    ) -> Result<Self, PlannerClientError> {
        // Create socket options for the reqrep socket
        let reqrep_opts = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: timeout_ms,
            send_timeout: 1000,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let reqrep = MonitoredSocket::new(ctx, zmq::REQ, reqrep_opts, &params.planner_endpoint)
            .map_err(PlannerClientError::SocketError)?;

        info!("Connected to planning service at {}", params.planner_endpoint);

        Ok(Self { reqrep })
    }

    /// Build a connector which opens a new client each time it is called.
    pub fn connector(ctx: zmq::Context, params: NetParams, timeout_ms: i32) -> Connector {
        Box::new(move || {
            PlannerClient::new(&ctx, &params, timeout_ms)
                .map(|c| Box::new(c) as Box<dyn MoveInterface>)
                .map_err(|e| MoveIfaceError::Transport("connect", e.to_string()))
        })
    }

    /// Send a command and wait for the response.
    fn request(&mut self, cmd: &PlannerCmd) -> Result<PlannerRep, MoveIfaceError> {
        let name = cmd.name();

        if !self.reqrep.connected() {
            return Err(MoveIfaceError::NotConnected);
        }

        trace!("-> {}", name);

        self.reqrep
            .send_json(cmd)
            .map_err(|e| MoveIfaceError::Transport(name, e.to_string()))?;

        match self.reqrep.recv_json::<PlannerRep>() {
            Ok(Some(PlannerRep::Error(msg))) => Err(MoveIfaceError::Rejected(name, msg)),
            Ok(Some(rep)) => {
                trace!("<- {:?}", rep);
                Ok(rep)
            }
            Ok(None) => Err(MoveIfaceError::Timeout(name)),
            Err(e) => Err(MoveIfaceError::Transport(name, e.to_string())),
        }
    }

    /// Send a command which is answered with [`PlannerRep::Ok`].
    fn command(&mut self, cmd: PlannerCmd) -> Result<(), MoveIfaceError> {
        match self.request(&cmd)? {
            PlannerRep::Ok => Ok(()),
            r => Err(unexpected(&cmd, r)),
        }
    }

    /// Send a command which is answered with a [`PlannerRep::Name`].
    fn name_query(&mut self, cmd: PlannerCmd) -> Result<String, MoveIfaceError> {
        match self.request(&cmd)? {
            PlannerRep::Name(n) => Ok(n),
            r => Err(unexpected(&cmd, r)),
        }
    }
}

impl MoveInterface for PlannerClient {
    fn set_named_target(&mut self, name: &str) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetNamedTarget(name.into()))
    }

    fn plan(&mut self) -> Result<(ErrorCode, MotionPlan), MoveIfaceError> {
        let cmd = PlannerCmd::Plan;
        match self.request(&cmd)? {
            PlannerRep::Plan { error_code, plan } => Ok((error_code, plan)),
            // A failed plan may be reported as a bare status
            PlannerRep::Status(error_code) => Ok((error_code, MotionPlan::default())),
            r => Err(unexpected(&cmd, r)),
        }
    }

    fn compute_cartesian_path(
        &mut self,
        waypoints: &[Pose],
        eef_step_m: f64,
        jump_threshold: f64,
        avoid_collisions: bool,
        constraints: Option<Constraints>,
    ) -> Result<CartesianPath, MoveIfaceError> {
        let cmd = PlannerCmd::ComputeCartesianPath {
            waypoints: waypoints.to_vec(),
            eef_step_m,
            jump_threshold,
            avoid_collisions,
            constraints,
        };

        match self.request(&cmd)? {
            PlannerRep::CartesianPath(p) => Ok(p),
            r => Err(unexpected(&cmd, r)),
        }
    }

    fn execute(&mut self, motion: &Motion) -> Result<ErrorCode, MoveIfaceError> {
        let cmd = PlannerCmd::Execute(motion.clone());
        match self.request(&cmd)? {
            PlannerRep::Status(s) => Ok(s),
            r => Err(unexpected(&cmd, r)),
        }
    }

    fn stop(&mut self) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::Stop)
    }

    fn get_current_pose(&mut self) -> Result<Pose, MoveIfaceError> {
        let cmd = PlannerCmd::GetCurrentPose;
        match self.request(&cmd)? {
            PlannerRep::Pose(p) => Ok(p),
            r => Err(unexpected(&cmd, r)),
        }
    }

    fn get_planning_frame(&mut self) -> Result<String, MoveIfaceError> {
        self.name_query(PlannerCmd::GetPlanningFrame)
    }

    fn get_end_effector_link(&mut self) -> Result<String, MoveIfaceError> {
        self.name_query(PlannerCmd::GetEndEffectorLink)
    }

    fn set_max_velocity_scaling(&mut self, factor: f64) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetMaxVelocityScaling(factor))
    }

    fn set_max_acceleration_scaling(&mut self, factor: f64) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetMaxAccelerationScaling(factor))
    }

    fn set_planning_time(&mut self, time_s: f64) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetPlanningTime(time_s))
    }

    fn set_planner_id(&mut self, planner_id: &str) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetPlannerId(planner_id.into()))
    }

    fn set_num_planning_attempts(&mut self, attempts: u32) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetNumPlanningAttempts(attempts))
    }

    fn set_path_constraints(&mut self, constraints: Constraints) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetPathConstraints(constraints))
    }

    fn set_goal_tolerance(&mut self, tolerance_m: f64) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetGoalTolerance(tolerance_m))
    }

    fn set_pose_reference_frame(&mut self, frame: &str) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::SetPoseReferenceFrame(frame.into()))
    }
}

impl PlanningScene for PlannerClient {
    fn apply_collision_object(&mut self, object: &CollisionObject) -> Result<(), MoveIfaceError> {
        self.command(PlannerCmd::ApplyCollisionObject(object.clone()))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn unexpected(cmd: &PlannerCmd, rep: PlannerRep) -> MoveIfaceError {
    MoveIfaceError::UnexpectedResponse(cmd.name(), format!("{:?}", rep))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    /// Serve `n` requests on a REP socket with the given handler.
    fn serve<F>(
        ctx: zmq::Context,
        endpoint: &'static str,
        n: usize,
        handler: F,
    ) -> thread::JoinHandle<Vec<PlannerCmd>>
    where
        F: Fn(&PlannerCmd) -> PlannerRep + Send + 'static,
    {
        let rep = ctx.socket(zmq::REP).unwrap();
        rep.bind(endpoint).unwrap();

        thread::spawn(move || {
            let mut cmds = Vec::new();
            for _ in 0..n {
                let msg = rep.recv_string(0).unwrap().unwrap();
                let cmd: PlannerCmd = serde_json::from_str(&msg).unwrap();
                let response = handler(&cmd);
                rep.send(serde_json::to_string(&response).unwrap().as_str(), 0)
                    .unwrap();
                cmds.push(cmd);
            }
            cmds
        })
    }

    fn net_params(endpoint: &str) -> NetParams {
        NetParams {
            action_endpoint: String::new(),
            event_endpoint: String::new(),
            planner_endpoint: endpoint.into(),
            surface_endpoint: String::new(),
        }
    }

    #[test]
    fn test_request_mapping() {
        let ctx = zmq::Context::new();
        let endpoint = "tcp://127.0.0.1:45731";

        let server = serve(ctx.clone(), endpoint, 3, |cmd| match cmd {
            PlannerCmd::GetPlanningFrame => PlannerRep::Name(String::from("world")),
            PlannerCmd::SetPlannerId(_) => PlannerRep::Error(String::from("unknown planner")),
            _ => PlannerRep::Ok,
        });

        let mut client = PlannerClient::new(&ctx, &net_params(endpoint), 2000).unwrap();

        assert_eq!(client.get_planning_frame().unwrap(), "world");
        assert!(matches!(
            client.set_planner_id("nope"),
            Err(MoveIfaceError::Rejected("SetPlannerId", _))
        ));
        // Ok where a name is expected is a protocol error
        assert!(matches!(
            client.get_end_effector_link(),
            Err(MoveIfaceError::UnexpectedResponse("GetEndEffectorLink", _))
        ));

        let cmds = server.join().unwrap();
        assert_eq!(cmds.len(), 3);
    }
}
