//! # Equipment Interface
//!
//! This module defines the interface structures exchanged with the planning/execution service and
//! the sensor pipeline feeding the obstacle model.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod geom;
pub mod planner;
pub mod scene;
