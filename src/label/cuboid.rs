//! The box label: an oriented cuboid, either committed or spawned as a
//! temporary drawn shape on a plane label.

use crate::camera::PinholeCamera;
use crate::geometry::Plane;
use crate::label::shape::{Cuboid, Shape};
use crate::label::{Drawable, LabelCore, LabelError};
use crate::snapshot::{ShapeCommit, StoreSnapshot};
use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};

#[derive(Debug, Clone)]
pub struct BoxLabel {
    core: LabelCore,
    shape: Shape,
    drag_active: bool,
}

impl BoxLabel {
    pub fn new() -> Self {
        BoxLabel {
            core: LabelCore::new(),
            shape: Shape::Cuboid(Cuboid::new(crate::snapshot::NO_ID)),
            drag_active: false,
        }
    }

    pub fn cuboid(&self) -> &Cuboid {
        match &self.shape {
            Shape::Cuboid(c) => c,
            _ => unreachable!("box label always owns a cuboid shape"),
        }
    }

    pub fn cuboid_mut(&mut self) -> &mut Cuboid {
        match &mut self.shape {
            Shape::Cuboid(c) => c,
            _ => unreachable!("box label always owns a cuboid shape"),
        }
    }

    /// Places the box at an explicit pose; used when spawning a drawn box on
    /// a plane so it starts aligned with the grid.
    pub(crate) fn set_pose(&mut self, center: Point3<f64>, rotation: UnitQuaternion<f64>) {
        let cuboid = self.cuboid_mut();
        cuboid.center = center;
        cuboid.rotation = rotation;
    }

    /// Starts a direct drag when the box is selected or an in-progress
    /// temporary. Returns whether the event was consumed.
    pub fn on_mouse_down(&mut self, _x: f64, _y: f64, _camera: &PinholeCamera) -> bool {
        if self.core.selected() || self.core.temporary() {
            self.drag_active = true;
        }
        self.drag_active
    }

    /// Drags the box across its support plane (the plane through its center,
    /// normal to its up axis). Returns whether the event was consumed.
    pub fn on_mouse_move(&mut self, x: f64, y: f64, camera: &PinholeCamera) -> bool {
        if !self.drag_active {
            return false;
        }
        let Ok(ray) = camera.pixel_to_world_ray(&Vector2::new(x, y)) else {
            return false;
        };
        let support = Plane::from_normal_and_point(self.cuboid().up(), &self.center());
        if let Some(hit) = ray.intersect_plane(&support) {
            let delta = hit - self.center();
            self.shape.translate(&delta);
        }
        true
    }

    pub fn on_mouse_up(&mut self) {
        self.drag_active = false;
    }
}

impl Default for BoxLabel {
    fn default() -> Self {
        BoxLabel::new()
    }
}

impl Drawable for BoxLabel {
    fn core(&self) -> &LabelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LabelCore {
        &mut self.core
    }

    fn init(
        &mut self,
        item: usize,
        category: usize,
        center: Option<Point3<f64>>,
        sensors: &[usize],
        temporary: bool,
    ) {
        self.core.init(item, category, sensors, temporary);
        if let Some(center) = center {
            self.cuboid_mut().center = center;
        }
    }

    fn update_state(
        &mut self,
        snapshot: &StoreSnapshot,
        item: usize,
        label_id: i64,
    ) -> Result<(), LabelError> {
        self.core.sync(snapshot, item, label_id)?;

        let shape_id = *snapshot
            .label(item, label_id)
            .ok_or(LabelError::MissingLabel(label_id))?
            .shapes
            .first()
            .ok_or(LabelError::EmptyShapeList(label_id))?;
        let shape_snapshot = snapshot
            .shape(item, shape_id)
            .ok_or(LabelError::MissingShape(shape_id))?;
        self.shape.update_from(shape_snapshot, shape_id)?;
        self.shape.set_label_id(label_id);
        Ok(())
    }

    fn shapes(&self) -> Vec<&Shape> {
        vec![&self.shape]
    }

    fn shapes_mut(&mut self) -> Vec<&mut Shape> {
        vec![&mut self.shape]
    }

    fn shape_states(&self) -> Result<ShapeCommit, LabelError> {
        self.core.ensure_initialized()?;
        Ok(ShapeCommit {
            label_id: self.core.id(),
            shape_ids: vec![self.shape.id()],
            kinds: vec![self.shape.kind()],
            shapes: vec![self.shape.to_snapshot()],
        })
    }

    fn translate(&mut self, delta: &Vector3<f64>) {
        self.shape.translate(delta);
    }

    fn rotate(&mut self, delta: &UnitQuaternion<f64>) {
        self.shape.rotate(delta);
    }

    fn scale(&mut self, factor: &Vector3<f64>, anchor: &Point3<f64>) {
        self.shape.scale(factor, anchor);
    }

    fn center(&self) -> Point3<f64> {
        self.shape.center()
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        self.shape.orientation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Resolution;
    use approx::assert_relative_eq;

    fn camera_looking_forward() -> PinholeCamera {
        let mut camera = PinholeCamera::new(Resolution {
            width: 100,
            height: 100,
        });
        camera.set_intrinsics((100.0, 100.0), (50.0, 50.0)).unwrap();
        camera
    }

    #[test]
    fn test_drag_requires_selection_or_temporary() {
        let camera = camera_looking_forward();
        let mut boxed = BoxLabel::new();
        boxed.init(0, 0, Some(Point3::new(0.0, 0.0, 5.0)), &[0], false);

        assert!(!boxed.on_mouse_down(50.0, 50.0, &camera));
        assert!(!boxed.on_mouse_move(60.0, 50.0, &camera));

        boxed.core_mut().set_selected(true);
        assert!(boxed.on_mouse_down(50.0, 50.0, &camera));
    }

    #[test]
    fn test_drag_moves_box_on_support_plane() {
        let camera = camera_looking_forward();
        let mut boxed = BoxLabel::new();
        boxed.init(0, 0, Some(Point3::new(0.0, 0.0, 5.0)), &[0], true);

        assert!(boxed.on_mouse_down(50.0, 50.0, &camera));
        assert!(boxed.on_mouse_move(60.0, 50.0, &camera));

        // The support plane is z = 5 (box up is +z, camera looks down +z).
        // A pixel 10 to the right of center lands at x = 10/100 * 5 = 0.5.
        let center = boxed.center();
        assert_relative_eq!(center.z, 5.0, epsilon = 1e-9);
        assert_relative_eq!(center.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);

        boxed.on_mouse_up();
        assert!(!boxed.on_mouse_move(70.0, 50.0, &camera));
    }
}
