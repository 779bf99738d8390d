//! # Planning Scene Communications Module
//!
//! Surface data received from the sensor reconstruction pipeline and the collision objects built
//! from it for the planning scene.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::geom::Pose;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A reconstructed surface streamed by the sensor pipeline.
///
/// Points are interpreted as consecutive, non-overlapping triangles: points `0, 1, 2` form the
/// first triangle, `3, 4, 5` the second, and so on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceMsg {
    /// Units: meters
    pub points_m: Vec<Vector3<f64>>,

    /// Pose of the surface in the planning frame.
    pub pose: Pose,
}

/// A triangle mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Units: meters
    pub vertices_m: Vec<Vector3<f64>>,

    /// Indices into `vertices_m`, one entry per triangle.
    pub triangles: Vec<[u32; 3]>,
}

/// An object in the planning scene built from meshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    pub id: String,
    pub frame_id: String,
    pub meshes: Vec<Mesh>,

    /// One pose per entry of `meshes`.
    pub mesh_poses: Vec<Pose>,

    pub operation: ObjectOperation,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Operation the planning scene shall perform with a collision object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectOperation {
    /// Add the object, replacing any object with the same id.
    Add,
    Remove,
    Append,
    Move,
}
