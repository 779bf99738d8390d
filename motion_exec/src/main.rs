//! Main motion executable entry point.
//!
//! # Architecture
//!
//! The executable bridges requesters and the planning/execution service:
//!
//!     - Initialise session, logging, parameters and network
//!     - Start the obstacle updater thread, which applies streamed surfaces to the planning scene
//!     - Main loop:
//!         - Handle pending requests (submit, cancel, status)
//!         - Reap finished goal workers
//!         - Publish and archive terminal goal events
//!
//! Each accepted goal runs on its own worker thread, so the main loop never blocks on planning or
//! execution.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

// Internal
use comms_if::{
    goal::GoalEvent,
    net::{zmq, NetParams},
};
use motion_lib::{
    action_server::{ActionServer, ActionServerError},
    goal_mgr::GoalMgr,
    obstacle::ObstacleUpdater,
    params::MotionExecParams,
    planner_client::PlannerClient,
    planning::SessionGate,
    surface_client::SurfaceClient,
};
use util::{
    logger::{logger_init, parse_level},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Time between attempts to connect the obstacle updater to the planning service.
const OBSTACLE_RECONNECT_PERIOD: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("motion_exec", "sessions").wrap_err("Failed to create the session")?;

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: MotionExecParams =
        util::params::load("motion_exec.toml").wrap_err("Could not load motion_exec params")?;

    // Initialise logger
    let log_level = parse_level(&exec_params.log_level).wrap_err("Invalid log level")?;
    logger_init(log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Motion Bridge Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    info!("Exec parameters loaded");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();

    let action_server = {
        let s = ActionServer::new(&zmq_ctx, &net_params)
            .wrap_err("Failed to initialise the ActionServer")?;
        info!("ActionServer initialised");
        s
    };

    let surface_client = {
        let c = SurfaceClient::new(&zmq_ctx, &net_params)
            .wrap_err("Failed to initialise the SurfaceClient")?;
        info!("SurfaceClient initialised");
        c
    };

    info!("Network initialisation complete");

    // ---- INITIALISE MODULES ----

    // The planning session is created lazily by the first goal
    let gate = SessionGate::new(PlannerClient::connector(
        zmq_ctx.clone(),
        net_params.clone(),
        exec_params.planner_timeout_ms,
    ));
    let (goal_mgr, events) = GoalMgr::new(
        gate,
        exec_params.planner.clone(),
        exec_params.finished_goal_records,
    );
    info!("GoalMgr initialised");

    let obstacle_run = Arc::new(AtomicBool::new(true));
    let obstacle_jh = {
        let run = obstacle_run.clone();
        let ctx = zmq_ctx.clone();
        let net_params = net_params.clone();
        let params = exec_params.clone();
        thread::Builder::new()
            .name(String::from("obstacle"))
            .spawn(move || obstacle_thread(surface_client, ctx, net_params, params, run))
            .wrap_err("Failed to start the obstacle updater")?
    };
    info!("Obstacle updater started");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut goal_mgr = goal_mgr;
    let result = main_loop(
        &action_server,
        &mut goal_mgr,
        &events,
        &session,
        exec_params.cycle_period_s,
    );

    // ---- SHUTDOWN ----

    if let Err(ref e) = result {
        error!("Main loop stopped: {}", e);
    }

    info!("Shutting down");

    goal_mgr.shutdown();
    for event in events.try_iter() {
        publish_and_archive(&action_server, &session, &event);
    }

    obstacle_run.store(false, Ordering::Relaxed);
    if obstacle_jh.join().is_err() {
        warn!("Obstacle updater panicked");
    }

    session.exit();

    result.wrap_err("An error occured while handling goal requests")
}

/// Run the main loop, only returns on an unrecoverable network error.
fn main_loop(
    action_server: &ActionServer,
    goal_mgr: &mut GoalMgr,
    events: &Receiver<GoalEvent>,
    session: &Session,
    cycle_period_s: f64,
) -> Result<(), ActionServerError> {
    let cycle_period = Duration::from_secs_f64(cycle_period_s);

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- REQUEST PROCESSING ----

        // Get requests until none remain
        loop {
            match action_server.recv_request() {
                Ok(Some(request)) => {
                    debug!("Request: {:?}", request);

                    let response = goal_mgr.handle_request(request);

                    if let Err(e) = action_server.send_response(response) {
                        warn!("Could not respond to request: {}", e);
                    }
                }
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    warn!("Invalid request: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        // ---- SUPERVISION ----

        goal_mgr.supervise();

        // ---- EVENTS ----

        for event in events.try_iter() {
            publish_and_archive(action_server, session, &event);
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period_s
            ),
        }
    }
}

fn publish_and_archive(action_server: &ActionServer, session: &Session, event: &GoalEvent) {
    if let Err(e) = action_server.publish_event(event) {
        warn!("{}", e);
    }

    session.save(format!("goals/goal_{}.json", event.goal_id.0), event.clone());
}

/// Obstacle updater thread, applies surfaces to the planning scene as they arrive.
///
/// Surfaces received while the planning scene is unreachable are kept in the model and applied
/// once it connects.
fn obstacle_thread(
    surface_client: SurfaceClient,
    ctx: zmq::Context,
    net_params: NetParams,
    params: MotionExecParams,
    run: Arc<AtomicBool>,
) {
    let mut updater = ObstacleUpdater::new(params.obstacle.clone());
    let mut last_connect_attempt: Option<Instant> = None;
    let mut surface_connected = false;

    while run.load(Ordering::Relaxed) {
        // Connect to the planning scene if not yet connected
        if !updater.is_connected() {
            let attempt_due = last_connect_attempt
                .map(|i| i.elapsed() >= OBSTACLE_RECONNECT_PERIOD)
                .unwrap_or(true);

            if attempt_due {
                last_connect_attempt = Some(Instant::now());
                connect_scene(&mut updater, &ctx, &net_params, params.planner_timeout_ms);
            }
        }

        if surface_client.is_connected() != surface_connected {
            surface_connected = !surface_connected;
            match surface_connected {
                true => info!("Surface publisher connected"),
                false => warn!("Surface publisher disconnected"),
            }
        }

        let surface = match surface_client.recv_surface() {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        if let Err(e) = updater.handle_surface(&surface) {
            warn!("Could not update the obstacle model: {}", e);
        }
    }
}

fn connect_scene(
    updater: &mut ObstacleUpdater,
    ctx: &zmq::Context,
    net_params: &NetParams,
    timeout_ms: i32,
) {
    let client = match PlannerClient::new(ctx, net_params, timeout_ms) {
        Ok(c) => c,
        Err(e) => {
            debug!("Obstacle updater could not connect: {}", e);
            return;
        }
    };

    info!("Obstacle updater connected to the planning scene");

    if let Err(e) = updater.connect(Box::new(client)) {
        warn!("Could not apply the obstacle model: {}", e);
    }
}
