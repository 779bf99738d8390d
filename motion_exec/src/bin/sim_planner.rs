//! # Simulated planning service
//!
//! A stand-in for the planning/execution service, used to exercise the motion executable without
//! a robot. The end effector is modelled as a point which moves in straight lines at a fixed
//! nominal speed, inside a sphere of reach around the base.
//!
//! Named targets `home` and `ready` are known, any other name fails to plan. Cartesian paths are
//! achieved up to the first waypoint outside the reach sphere.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use nalgebra::Vector3;
use std::{thread, time::Duration};

use comms_if::{
    eqpt::{
        geom::Pose,
        planner::{
            CartesianPath, Constraints, ErrorCode, Motion, MotionPlan, PlannerCmd, PlannerRep,
            RobotTrajectory, TrajectoryPoint,
        },
    },
    net::{bind_endpoint, zmq, MonitoredSocket, NetParams, SocketOptions},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Radius of the reachable workspace.
///
/// Units: meters
const REACH_M: f64 = 0.85;

/// End effector speed at a velocity scaling of 1.
///
/// Units: meters/second
const NOMINAL_SPEED_MPS: f64 = 0.5;

const PLANNING_FRAME: &str = "world";
const EEF_LINK: &str = "tool0";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

struct SimPlanner {
    current: Pose,
    target: Option<Pose>,
    velocity_scaling: f64,
    constraints: Constraints,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let session = Session::new("sim_planner", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    let ctx = zmq::Context::new();
    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        linger: 1,
        recv_timeout: 100,
        send_timeout: 1000,
        ..Default::default()
    };

    // The service binds, the motion executable connects to it
    let endpoint = bind_endpoint(&net_params.planner_endpoint);
    let socket = MonitoredSocket::new(&ctx, zmq::REP, socket_options, &endpoint)
        .wrap_err("Failed to open the planner socket")?;

    info!("Simulated planning service listening on {}", endpoint);

    let mut sim = SimPlanner::new();

    loop {
        let cmd: PlannerCmd = match socket.recv_json() {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                warn!("Invalid command: {}", e);
                socket
                    .send_json(&PlannerRep::Error(e.to_string()))
                    .wrap_err("Could not send error response")?;
                continue;
            }
        };

        debug!("{}", cmd.name());

        let rep = sim.handle(cmd);

        socket
            .send_json(&rep)
            .wrap_err("Could not send response")?;
    }
}

impl SimPlanner {
    fn new() -> Self {
        Self {
            current: named_pose("home").unwrap_or_default(),
            target: None,
            velocity_scaling: 1.0,
            constraints: Constraints::default(),
        }
    }

    fn handle(&mut self, cmd: PlannerCmd) -> PlannerRep {
        match cmd {
            PlannerCmd::SetNamedTarget(name) => {
                self.target = named_pose(&name);
                PlannerRep::Ok
            }
            PlannerCmd::Plan => match self.target {
                Some(t) => {
                    let trajectory = self.line_trajectory(&[t], 0.01);
                    PlannerRep::Plan {
                        error_code: ErrorCode::SUCCESS,
                        plan: MotionPlan {
                            trajectory,
                            planning_time_s: 0.05,
                        },
                    }
                }
                None => PlannerRep::Status(ErrorCode::NO_IK_SOLUTION),
            },
            PlannerCmd::ComputeCartesianPath {
                waypoints,
                eef_step_m,
                constraints,
                ..
            } => PlannerRep::CartesianPath(self.cartesian_path(&waypoints, eef_step_m, constraints)),
            PlannerCmd::Execute(motion) => PlannerRep::Status(self.execute(&motion)),
            PlannerCmd::Stop => PlannerRep::Ok,
            PlannerCmd::GetCurrentPose => PlannerRep::Pose(self.current),
            PlannerCmd::GetPlanningFrame => PlannerRep::Name(PLANNING_FRAME.into()),
            PlannerCmd::GetEndEffectorLink => PlannerRep::Name(EEF_LINK.into()),
            PlannerCmd::SetMaxVelocityScaling(v) => {
                if v <= 0.0 || v > 1.0 {
                    return PlannerRep::Error(format!("Velocity scaling {} out of range", v));
                }
                self.velocity_scaling = v;
                PlannerRep::Ok
            }
            PlannerCmd::SetPathConstraints(c) => {
                self.constraints = c;
                PlannerRep::Ok
            }
            PlannerCmd::ApplyCollisionObject(obj) => {
                info!(
                    "Collision object \"{}\" now has {} meshes",
                    obj.id,
                    obj.meshes.len()
                );
                PlannerRep::Ok
            }
            PlannerCmd::SetMaxAccelerationScaling(_)
            | PlannerCmd::SetPlanningTime(_)
            | PlannerCmd::SetPlannerId(_)
            | PlannerCmd::SetNumPlanningAttempts(_)
            | PlannerCmd::SetGoalTolerance(_)
            | PlannerCmd::SetPoseReferenceFrame(_) => PlannerRep::Ok,
        }
    }

    fn cartesian_path(
        &self,
        waypoints: &[Pose],
        eef_step_m: f64,
        constraints: Option<Constraints>,
    ) -> CartesianPath {
        let reachable = waypoints
            .iter()
            .take_while(|p| p.position_m.norm() <= REACH_M && satisfies(p, &constraints))
            .count();

        let fraction = match waypoints.len() {
            0 => 0.0,
            n => reachable as f64 / n as f64,
        };

        CartesianPath {
            trajectory: self.line_trajectory(&waypoints[..reachable], eef_step_m),
            fraction,
            error_code: match reachable {
                0 => ErrorCode::NO_IK_SOLUTION,
                _ => ErrorCode::SUCCESS,
            },
        }
    }

    fn execute(&mut self, motion: &Motion) -> ErrorCode {
        let traj = motion.trajectory();

        let last = match traj.points.last() {
            Some(p) => p,
            None => return ErrorCode::INVALID_MOTION_PLAN,
        };

        thread::sleep(Duration::from_secs_f64(last.time_from_start_s.max(0.0)));

        if let [x, y, z] = last.positions.as_slice() {
            self.current.position_m = Vector3::new(*x, *y, *z);
        }

        ErrorCode::SUCCESS
    }

    /// Straight line trajectory from the current pose through the given poses.
    fn line_trajectory(&self, poses: &[Pose], step_m: f64) -> RobotTrajectory {
        let speed = NOMINAL_SPEED_MPS * self.velocity_scaling;
        let mut points = Vec::new();
        let mut from = self.current.position_m;
        let mut t = 0.0;

        for pose in poses {
            let to = pose.position_m;
            let dist = (to - from).norm();
            let steps = (dist / step_m.max(1e-3)).ceil().max(1.0) as usize;

            for i in 1..=steps {
                let p = from + (to - from) * (i as f64 / steps as f64);
                t += dist / steps as f64 / speed;
                points.push(TrajectoryPoint {
                    positions: vec![p.x, p.y, p.z],
                    velocities: Vec::new(),
                    time_from_start_s: t,
                });
            }

            from = to;
        }

        RobotTrajectory {
            joint_names: vec!["x".into(), "y".into(), "z".into()],
            points,
        }
    }
}

fn named_pose(name: &str) -> Option<Pose> {
    match name {
        "home" => Some(Pose::from_position(0.3, 0.0, 0.5)),
        "ready" => Some(Pose::from_position(0.4, 0.2, 0.3)),
        _ => None,
    }
}

/// Returns true if the pose lies inside every position constraint.
fn satisfies(pose: &Pose, constraints: &Option<Constraints>) -> bool {
    match constraints {
        Some(c) => c
            .position_constraints
            .iter()
            .all(|pc| (pose.position_m - pc.center_m).norm() <= pc.radius_m),
        None => true,
    }
}
