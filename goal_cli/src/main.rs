//! # Goal command line
//!
//! Interactive requester for the motion executable. Goals are submitted, cancelled and queried
//! over the action socket, terminal events are collected from the event socket and printed with
//! the `events` command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::{clap::AppSettings, StructOpt};

use comms_if::{
    eqpt::geom::Pose,
    goal::{ActionRequest, ActionResponse, GoalEvent, GoalId, MotionGoal},
    net::{zmq, MonitoredSocket, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "goal $ ";
const HISTORY_PATH: &str = "data/goal_cli_history.txt";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "goal_cli", about = "Submit and manage motion goals")]
struct Args {
    /// Endpoint of the motion executable's action socket
    #[structopt(long, default_value = "tcp://localhost:5100")]
    action_endpoint: String,

    /// Endpoint of the motion executable's event socket
    #[structopt(long, default_value = "tcp://localhost:5101")]
    event_endpoint: String,
}

#[derive(Debug, StructOpt)]
struct Scaling {
    /// Maximum velocity scaling factor
    #[structopt(long, default_value = "0.5")]
    velocity: f64,

    /// Maximum acceleration scaling factor
    #[structopt(long, default_value = "0.5")]
    acceleration: f64,
}

/// Connections to the motion executable.
struct Requester {
    action: MonitoredSocket,
    events: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(
    name = "",
    setting = AppSettings::NoBinaryName,
    setting = AppSettings::DisableVersion,
    setting = AppSettings::VersionlessSubcommands
)]
enum Command {
    /// Move to a named robot state
    Named {
        name: String,

        #[structopt(flatten)]
        scaling: Scaling,
    },

    /// Move to a Cartesian destination, orientation given as qx qy qz qw
    #[structopt(setting = AppSettings::AllowNegativeNumbers)]
    Dest {
        x: f64,
        y: f64,
        z: f64,
        orientation: Vec<f64>,

        #[structopt(flatten)]
        scaling: Scaling,
    },

    /// Follow a JSON array of poses
    Waypoints {
        json: Vec<String>,

        #[structopt(flatten)]
        scaling: Scaling,
    },

    /// Cancel a goal
    Cancel { id: u64 },

    /// Get the status of a goal
    Status { id: u64 },

    /// Print the terminal events recieved so far
    Events,

    /// Exit the shell
    Exit,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let args = Args::from_args();

    let ctx = zmq::Context::new();
    let requester = Requester::new(&ctx, &args)?;

    let mut rl = DefaultEditor::new().wrap_err("Could not create the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("Unhandled Error: {:?}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        rl.add_history_entry(line.as_str()).ok();

        let cmd = match Command::from_iter_safe(line.split_whitespace()) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        match cmd {
            Command::Exit => break,
            cmd => {
                if let Err(e) = requester.exec(cmd) {
                    println!("Error: {:#}", e);
                }
            }
        }
    }

    if let Some(parent) = std::path::Path::new(HISTORY_PATH).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    rl.save_history(HISTORY_PATH)
        .wrap_err("Could not save history")?;

    println!("Exiting...");

    Ok(())
}

impl Requester {
    fn new(ctx: &zmq::Context, args: &Args) -> Result<Self, Report> {
        let action_opts = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 2000,
            send_timeout: 1000,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let events_opts = SocketOptions {
            block_on_first_connect: false,
            linger: 1,
            recv_timeout: 0,
            ..Default::default()
        };

        Ok(Self {
            action: MonitoredSocket::new(ctx, zmq::REQ, action_opts, &args.action_endpoint)
                .wrap_err("Could not open the action socket")?,
            events: MonitoredSocket::new(ctx, zmq::SUB, events_opts, &args.event_endpoint)
                .wrap_err("Could not open the event socket")?,
        })
    }

    fn exec(&self, cmd: Command) -> Result<(), Report> {
        let request = match cmd {
            Command::Named { name, scaling } => ActionRequest::Submit(MotionGoal {
                state: name,
                velocity: scaling.velocity,
                acceleration: scaling.acceleration,
                ..Default::default()
            }),
            Command::Dest {
                x,
                y,
                z,
                orientation,
                scaling,
            } => {
                let q = match orientation.as_slice() {
                    [] => [0.0, 0.0, 0.0, 1.0],
                    [qx, qy, qz, qw] => [*qx, *qy, *qz, *qw],
                    o => return Err(eyre!("Expected 0 or 4 orientation values, got {}", o.len())),
                };

                ActionRequest::Submit(MotionGoal {
                    destination: Pose::new([x, y, z], q),
                    velocity: scaling.velocity,
                    acceleration: scaling.acceleration,
                    ..Default::default()
                })
            }
            Command::Waypoints { json, scaling } => {
                let poses: Vec<Pose> =
                    serde_json::from_str(&json.join(" ")).wrap_err("Invalid waypoint list")?;

                ActionRequest::Submit(MotionGoal {
                    pose_array: poses,
                    velocity: scaling.velocity,
                    acceleration: scaling.acceleration,
                    ..Default::default()
                })
            }
            Command::Cancel { id } => ActionRequest::Cancel(GoalId(id)),
            Command::Status { id } => ActionRequest::Status(GoalId(id)),
            Command::Events => {
                self.print_events()?;
                return Ok(());
            }
            Command::Exit => return Ok(()),
        };

        let response = self.request(&request)?;

        match response {
            ActionResponse::Accepted(id) => println!("Goal accepted as {}", id),
            ActionResponse::Rejected => println!("Goal rejected"),
            ActionResponse::CancelAccepted => println!("Cancellation requested"),
            ActionResponse::Status(s) => match s.outcome {
                Some(o) => println!("Goal {}: {:?}", s.goal_id, o),
                None => println!("Goal {}: {:?}", s.goal_id, s.state),
            },
            ActionResponse::UnknownGoal => println!("Unknown goal"),
            ActionResponse::Invalid => println!("The motion executable could not parse the request"),
        }

        Ok(())
    }

    fn request(&self, request: &ActionRequest) -> Result<ActionResponse, Report> {
        if !self.action.connected() {
            return Err(eyre!("Not connected to the motion executable"));
        }

        self.action
            .send_json(request)
            .wrap_err("Could not send the request")?;

        self.action
            .recv_json()
            .wrap_err("Could not recieve the response")?
            .ok_or_else(|| eyre!("No response from the motion executable"))
    }

    fn print_events(&self) -> Result<(), Report> {
        let mut count = 0;

        while let Some(event) = self
            .events
            .recv_json::<GoalEvent>()
            .wrap_err("Could not recieve events")?
        {
            count += 1;

            let code = event
                .error_code
                .map(|c| format!(", status {}", c.0))
                .unwrap_or_default();

            println!(
                "[{}] Goal {} {:?} (success: {}{}) {}",
                event.timestamp.format("%H:%M:%S"),
                event.goal_id,
                event.outcome,
                event.result.success,
                code,
                event.message
            );
        }

        if count == 0 {
            println!("No new events");
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::from_iter_safe(line.split_whitespace()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        match parse("dest 0.4 -0.2 0.3 --velocity 0.2") {
            Command::Dest {
                x,
                y,
                z,
                orientation,
                scaling,
            } => {
                assert_eq!((x, y, z), (0.4, -0.2, 0.3));
                assert!(orientation.is_empty());
                assert_eq!(scaling.velocity, 0.2);
                assert_eq!(scaling.acceleration, 0.5);
            }
            c => panic!("Unexpected command {:?}", c),
        }

        assert!(matches!(parse("cancel 3"), Command::Cancel { id: 3 }));
        assert!(matches!(parse("exit"), Command::Exit));
        assert!(Command::from_iter_safe("launch".split_whitespace()).is_err());
    }
}
