//! # Planning module
//!
//! Everything that happens against the planning/execution service for one goal:
//!
//! - [`session`]: the lazily initialised, process-wide planning session.
//! - [`config`]: per-goal planner configuration (scaling, time budget, planner, constraints).
//! - [`synth`]: trajectory synthesis for each goal kind.
//! - [`exec`]: execution of a synthesised motion and interpretation of its status.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod config;
pub mod exec;
mod params;
pub mod session;
pub mod synth;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use config::PlanningConfig;
pub use params::PlannerCfgParams;
pub use session::{Connector, PlanningSession, SessionGate, SessionGateError};
pub use synth::SynthesisResult;
