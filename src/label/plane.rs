//! The plane label: a ground-aligned grid that anchors child labels and
//! supplies the reference plane for the bird's-eye homography.

use crate::label::shape::{GridPlane, Shape};
use crate::label::{Drawable, LabelCore, LabelError};
use crate::snapshot::{ShapeCommit, StoreSnapshot};
use nalgebra::{Point3, UnitQuaternion, Vector3};

#[derive(Debug, Clone)]
pub struct PlaneLabel {
    core: LabelCore,
    shape: Shape,
    /// In-progress drawn child, spawned by mouse-down while selected.
    temporary_child: Option<i64>,
}

impl PlaneLabel {
    pub fn new() -> Self {
        PlaneLabel {
            core: LabelCore::new(),
            shape: Shape::Grid(GridPlane::new(crate::snapshot::NO_ID)),
            temporary_child: None,
        }
    }

    pub fn grid(&self) -> &GridPlane {
        match &self.shape {
            Shape::Grid(g) => g,
            // The shape variant is fixed at construction.
            _ => unreachable!("plane label always owns a grid shape"),
        }
    }

    pub fn grid_mut(&mut self) -> &mut GridPlane {
        match &mut self.shape {
            Shape::Grid(g) => g,
            _ => unreachable!("plane label always owns a grid shape"),
        }
    }

    pub fn temporary_child(&self) -> Option<i64> {
        self.temporary_child
    }

    pub(crate) fn set_temporary_child(&mut self, child: Option<i64>) {
        self.temporary_child = child;
    }
}

impl Default for PlaneLabel {
    fn default() -> Self {
        PlaneLabel::new()
    }
}

impl Drawable for PlaneLabel {
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
            self.grid_mut().center = center;
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
    use crate::snapshot::{
        ItemSnapshot, LabelKind, LabelSnapshot, QuaternionData, Selection, ShapeSnapshot,
        Vec3Data, ViewerConfig, NO_ID,
    };
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn snapshot_with_plane() -> StoreSnapshot {
        let mut item = ItemSnapshot::default();
        item.labels.insert(
            5,
            LabelSnapshot {
                id: 5,
                item: 0,
                kind: LabelKind::Plane3d,
                track: 2,
                category: vec![0],
                attributes: HashMap::new(),
                parent: NO_ID,
                children: vec![],
                shapes: vec![21],
                sensors: vec![0],
            },
        );
        item.shapes.insert(
            21,
            ShapeSnapshot::Grid {
                center: Vec3Data::new(1.0, 2.0, 3.0),
                rotation: QuaternionData::default(),
                scale: Vec3Data::new(4.0, 4.0, 1.0),
            },
        );
        StoreSnapshot {
            items: vec![item],
            sensors: HashMap::new(),
            select: Selection::default(),
            viewer: ViewerConfig::default(),
        }
    }

    #[test]
    fn test_update_state_is_idempotent() {
        let snapshot = snapshot_with_plane();
        let mut plane = PlaneLabel::new();

        plane.update_state(&snapshot, 0, 5).unwrap();
        let first_center = plane.center();
        let first_color = plane.core().color();

        plane.update_state(&snapshot, 0, 5).unwrap();
        assert_relative_eq!(plane.center(), first_center, epsilon = 1e-12);
        assert_eq!(plane.core().color(), first_color);
        assert_eq!(plane.core().id(), 5);
        assert_eq!(plane.core().track(), 2);
    }

    #[test]
    fn test_shape_states_round_trip() {
        let snapshot = snapshot_with_plane();
        let mut plane = PlaneLabel::new();
        plane.update_state(&snapshot, 0, 5).unwrap();

        let commit = plane.shape_states().unwrap();
        assert_eq!(commit.label_id, 5);
        assert_eq!(commit.shape_ids, vec![21]);
        assert_eq!(
            commit.shapes[0],
            *snapshot.shape(0, 21).unwrap()
        );
    }

    #[test]
    fn test_shape_states_before_init_fails_fast() {
        let plane = PlaneLabel::new();
        assert!(matches!(
            plane.shape_states(),
            Err(LabelError::Uninitialized)
        ));
    }
}
