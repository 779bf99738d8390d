//! # Motion bridge library.
//!
//! This library allows other crates in the workspace to access items defined inside the motion
//! executable, and allows the goal lifecycle to be driven against substitute planning services.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Action server - accepts goal requests from requesters and publishes terminal events
pub mod action_server;

/// Goal manager - classifies, dispatches, supervises and cancels motion goals
pub mod goal_mgr;

/// Interfaces to the planning/execution service and the planning scene
pub mod move_iface;

/// Obstacle model - turns streamed sensor surfaces into a collision object
pub mod obstacle;

/// Executable parameters
pub mod params;

/// Planner client - zmq implementation of the planning service interfaces
pub mod planner_client;

/// Planning session, configuration, trajectory synthesis and execution
pub mod planning;

/// Surface client - recieves reconstructed surfaces from the sensor pipeline
pub mod surface_client;
