//! # Obstacle model
//!
//! Maintains a single collision object built from the surfaces streamed by the sensor
//! reconstruction pipeline. Each received surface is converted into a triangle mesh which is
//! appended to the object, the whole object is then re-applied to the planning scene so that it
//! replaces the previous geometry.
//!
//! The updater runs independently of goal execution, a goal may plan against the obstacle set as
//! it was before the latest update.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::{
    geom::Pose,
    scene::{CollisionObject, Mesh, ObjectOperation, SurfaceMsg},
};
use log::{debug, info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::move_iface::{MoveIfaceError, PlanningScene};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the obstacle collision object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleParams {
    /// ID of the collision object in the planning scene.
    pub object_id: String,

    /// Frame in which mesh poses are expressed.
    pub frame_id: String,
}

/// The accumulated obstacle geometry.
#[derive(Debug, Clone)]
pub struct ObstacleModel {
    object: CollisionObject,
}

/// Applies received surfaces to the planning scene.
///
/// Surfaces are accumulated whether or not a scene is connected, the whole model is applied as
/// soon as one is.
pub struct ObstacleUpdater {
    scene: Option<Box<dyn PlanningScene>>,

    /// Created on the first received surface.
    model: Option<ObstacleModel>,

    /// True if the model holds meshes the scene has not yet seen.
    pending: bool,

    params: ObstacleParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ObstacleError {
    #[error("The surface contains no complete triangle ({0} points)")]
    NoTriangles(usize),

    #[error("Could not apply the obstacle to the planning scene: {0}")]
    SceneError(MoveIfaceError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ObstacleParams {
    fn default() -> Self {
        Self {
            object_id: String::from("surface_mesh"),
            frame_id: String::from("world"),
        }
    }
}

impl ObstacleModel {
    pub fn new(params: &ObstacleParams) -> Self {
        Self {
            object: CollisionObject {
                id: params.object_id.clone(),
                frame_id: params.frame_id.clone(),
                meshes: Vec::new(),
                mesh_poses: Vec::new(),
                operation: ObjectOperation::Add,
            },
        }
    }

    /// Append a mesh at the given pose. Previously appended meshes are kept.
    pub fn append(&mut self, mesh: Mesh, pose: Pose) {
        self.object.meshes.push(mesh);
        self.object.mesh_poses.push(pose);
    }

    pub fn num_meshes(&self) -> usize {
        self.object.meshes.len()
    }

    /// The collision object to apply to the scene.
    pub fn object(&self) -> &CollisionObject {
        &self.object
    }
}

impl ObstacleUpdater {
    pub fn new(params: ObstacleParams) -> Self {
        Self {
            scene: None,
            model: None,
            pending: false,
            params,
        }
    }

    pub fn model(&self) -> Option<&ObstacleModel> {
        self.model.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.scene.is_some()
    }

    /// Attach a planning scene and apply any meshes received so far.
    pub fn connect(&mut self, scene: Box<dyn PlanningScene>) -> Result<(), ObstacleError> {
        self.scene = Some(scene);
        self.pending = self.model.is_some();

        self.apply()
    }

    /// Add a surface to the model.
    ///
    /// A surface without any complete triangle is discarded and leaves the model unchanged.
    pub fn append(&mut self, surface: &SurfaceMsg) -> Result<(), ObstacleError> {
        let mesh = build_mesh(&surface.points_m)?;

        debug!(
            "Received surface with {} triangles",
            mesh.triangles.len()
        );

        let params = &self.params;
        self.model
            .get_or_insert_with(|| ObstacleModel::new(params))
            .append(mesh, surface.pose);
        self.pending = true;

        Ok(())
    }

    /// Apply the model to the planning scene if it has changed since it was last applied.
    ///
    /// Nothing is done without a connected scene. If the scene cannot be updated the meshes stay
    /// pending, and a connection fault detaches the scene so that it can be reconnected.
    pub fn apply(&mut self) -> Result<(), ObstacleError> {
        let (scene, model) = match (self.scene.as_mut(), self.model.as_ref()) {
            (Some(s), Some(m)) if self.pending => (s, m),
            _ => return Ok(()),
        };

        if let Err(e) = scene.apply_collision_object(model.object()) {
            if e.is_connection_fault() {
                warn!("Planning scene connection lost");
                self.scene = None;
            }
            return Err(ObstacleError::SceneError(e));
        }

        self.pending = false;

        info!(
            "Obstacle \"{}\" updated, {} meshes",
            model.object().id,
            model.num_meshes()
        );

        Ok(())
    }

    /// Add a received surface to the model and apply the model to the planning scene.
    pub fn handle_surface(&mut self, surface: &SurfaceMsg) -> Result<(), ObstacleError> {
        self.append(surface)?;
        self.apply()
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a mesh from a list of points taken as consecutive triangles.
///
/// Trailing points which do not form a complete triangle are ignored.
pub fn build_mesh(points_m: &[Vector3<f64>]) -> Result<Mesh, ObstacleError> {
    let num_triangles = points_m.len() / 3;

    if num_triangles == 0 {
        return Err(ObstacleError::NoTriangles(points_m.len()));
    }

    if points_m.len() % 3 != 0 {
        warn!(
            "Ignoring {} trailing surface points",
            points_m.len() % 3
        );
    }

    let vertices_m = points_m[..num_triangles * 3].to_vec();
    let triangles = (0..num_triangles as u32)
        .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
        .collect();

    Ok(Mesh {
        vertices_m,
        triangles,
    })
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::move_iface::MockPlanningScene;
    use std::sync::{Arc, Mutex};

    fn triangle(z: f64) -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, z),
            Vector3::new(1.0, 0.0, z),
            Vector3::new(0.0, 1.0, z),
        ]
    }

    #[test]
    fn test_build_mesh() {
        let mut points = triangle(0.0);
        points.extend(triangle(1.0));
        points.push(Vector3::new(5.0, 5.0, 5.0));

        let mesh = build_mesh(&points).unwrap();
        assert_eq!(mesh.vertices_m.len(), 6);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [3, 4, 5]]);

        assert!(matches!(
            build_mesh(&points[..2]),
            Err(ObstacleError::NoTriangles(2))
        ));
    }

    #[test]
    fn test_sequential_surfaces_accumulate() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let applied_clone = applied.clone();

        let mut scene = MockPlanningScene::new();
        scene
            .expect_apply_collision_object()
            .times(2)
            .returning(move |obj| {
                applied_clone.lock().unwrap().push(obj.clone());
                Ok(())
            });

        let mut updater = ObstacleUpdater::new(ObstacleParams::default());
        updater.connect(Box::new(scene)).unwrap();
        assert!(updater.model().is_none());

        for z in [0.0, 1.0].iter() {
            updater
                .handle_surface(&SurfaceMsg {
                    points_m: triangle(*z),
                    pose: Pose::from_position(0.0, 0.0, *z),
                })
                .unwrap();
        }

        assert_eq!(updater.model().map(|m| m.num_meshes()), Some(2));

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].meshes.len(), 1);

        // The second application still carries the first mesh
        let last = &applied[1];
        assert_eq!(last.id, "surface_mesh");
        assert_eq!(last.operation, ObjectOperation::Add);
        assert_eq!(last.meshes.len(), 2);
        assert_eq!(last.mesh_poses.len(), 2);
        assert_eq!(last.mesh_poses[0], Pose::from_position(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_empty_surface_discarded() {
        let mut scene = MockPlanningScene::new();
        scene.expect_apply_collision_object().never();

        let mut updater = ObstacleUpdater::new(ObstacleParams::default());
        updater.connect(Box::new(scene)).unwrap();
        assert!(updater.handle_surface(&SurfaceMsg::default()).is_err());
        assert!(updater.model().is_none());
    }

    #[test]
    fn test_scene_failure_keeps_mesh() {
        let mut scene = MockPlanningScene::new();
        scene
            .expect_apply_collision_object()
            .times(1)
            .returning(|_| Err(MoveIfaceError::Timeout("ApplyCollisionObject")));

        let mut updater = ObstacleUpdater::new(ObstacleParams::default());
        updater.connect(Box::new(scene)).unwrap();
        let res = updater.handle_surface(&SurfaceMsg {
            points_m: triangle(0.0),
            pose: Pose::default(),
        });

        assert!(matches!(res, Err(ObstacleError::SceneError(_))));
        assert_eq!(updater.model().map(|m| m.num_meshes()), Some(1));
        assert!(!updater.is_connected());

        // The kept mesh is applied on reconnection
        let applied = Arc::new(Mutex::new(Vec::new()));
        let applied_clone = applied.clone();
        let mut scene = MockPlanningScene::new();
        scene
            .expect_apply_collision_object()
            .times(1)
            .returning(move |obj| {
                applied_clone.lock().unwrap().push(obj.meshes.len());
                Ok(())
            });

        updater.connect(Box::new(scene)).unwrap();
        assert_eq!(*applied.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_surfaces_before_connection_are_applied() {
        let mut updater = ObstacleUpdater::new(ObstacleParams::default());

        // No scene yet, the surface is only recorded
        updater
            .handle_surface(&SurfaceMsg {
                points_m: triangle(0.0),
                pose: Pose::from_position(0.0, 0.0, 0.0),
            })
            .unwrap();
        assert!(!updater.is_connected());
        assert_eq!(updater.model().map(|m| m.num_meshes()), Some(1));

        let applied = Arc::new(Mutex::new(Vec::new()));
        let applied_clone = applied.clone();
        let mut scene = MockPlanningScene::new();
        scene
            .expect_apply_collision_object()
            .times(2)
            .returning(move |obj| {
                applied_clone.lock().unwrap().push(obj.clone());
                Ok(())
            });

        updater.connect(Box::new(scene)).unwrap();
        updater
            .handle_surface(&SurfaceMsg {
                points_m: triangle(1.0),
                pose: Pose::from_position(0.0, 0.0, 1.0),
            })
            .unwrap();

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].meshes.len(), 1);
        assert_eq!(applied[0].mesh_poses[0], Pose::from_position(0.0, 0.0, 0.0));
        assert_eq!(applied[1].meshes.len(), 2);
    }

    #[test]
    fn test_connect_without_surfaces_applies_nothing() {
        let mut scene = MockPlanningScene::new();
        scene.expect_apply_collision_object().never();

        let mut updater = ObstacleUpdater::new(ObstacleParams::default());
        updater.connect(Box::new(scene)).unwrap();
        assert!(updater.is_connected());
        assert!(updater.model().is_none());
    }
}
