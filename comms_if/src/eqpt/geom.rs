//! # Geometry types shared across the interface

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A pose of the end effector (or of an object) in the planning frame.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    /// Position in the planning frame.
    ///
    /// Units: meters
    pub position_m: Vector3<f64>,

    /// Orientation in the planning frame, serialised as `[x, y, z, w]`.
    pub orientation_q: Quaternion<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Create a new pose from a position and an `(x, y, z, w)` quaternion.
    pub fn new(position_m: [f64; 3], orientation_xyzw: [f64; 4]) -> Self {
        Self {
            position_m: Vector3::new(position_m[0], position_m[1], position_m[2]),
            orientation_q: Quaternion::new(
                orientation_xyzw[3],
                orientation_xyzw[0],
                orientation_xyzw[1],
                orientation_xyzw[2],
            ),
        }
    }

    /// Create a pose at the given position with the identity orientation.
    pub fn from_position(x: f64, y: f64, z: f64) -> Self {
        Self {
            position_m: Vector3::new(x, y, z),
            ..Default::default()
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            orientation_q: Quaternion::identity(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pose_orientation_order() {
        let pose = Pose::new([1.0, 2.0, 3.0], [0.1, 0.2, 0.3, 0.9]);

        assert_eq!(pose.orientation_q.w, 0.9);
        assert_eq!(pose.orientation_q.i, 0.1);
        assert_eq!(pose.orientation_q.j, 0.2);
        assert_eq!(pose.orientation_q.k, 0.3);

        // Serialised as [x, y, z, w]
        let json = serde_json::to_value(&pose).unwrap();
        assert_eq!(json["orientation_q"], serde_json::json!([0.1, 0.2, 0.3, 0.9]));
    }

    #[test]
    fn test_missing_fields_default() {
        let pose: Pose = serde_json::from_str(r#"{"position_m": [1.0, 0.0, 2.0]}"#).unwrap();

        assert_eq!(pose.position_m, Vector3::new(1.0, 0.0, 2.0));
        assert_eq!(pose.orientation_q, Quaternion::identity());
    }
}
