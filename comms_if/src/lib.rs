//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the motion bridge: the requester-facing goal
//! protocol, the planning service protocol, and the networking layer both are carried over.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Goal protocol between requesters and the motion executable
pub mod goal;

/// Command and response definitions for equipment (planning service, planning scene)
pub mod eqpt;

/// Network module
pub mod net;
