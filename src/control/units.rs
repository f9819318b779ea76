//! Concrete control units: translation axes and rotation rings.

use super::{ControlUnit, UnitDelta, UnitFeedback};
use crate::geometry::{Plane, Ray};
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

/// Straight handle that constrains a drag to a single axis.
///
/// Each pointer step intersects the drag plane and keeps only the component
/// of the motion along the axis, expressed in the controller's current
/// reference frame. Every delta is relative to the previous step's hit
/// point, so a drag that returns to its start sums to zero.
pub struct TranslationAxis {
    axis: Unit<Vector3<f64>>,
    feedback: UnitFeedback,
}

impl TranslationAxis {
    pub fn new(axis: Unit<Vector3<f64>>) -> Self {
        TranslationAxis {
            axis,
            feedback: UnitFeedback::Idle,
        }
    }

    pub fn axis(&self) -> Unit<Vector3<f64>> {
        self.axis
    }
}

impl ControlUnit for TranslationAxis {
    fn delta(
        &self,
        old_intersection: &Point3<f64>,
        pointer: &Ray,
        drag_plane: &Plane,
        frame: &UnitQuaternion<f64>,
    ) -> Option<UnitDelta> {
        let hit = pointer.intersect_plane(drag_plane)?;
        let axis = frame * self.axis.into_inner();
        let translation = axis * (hit - old_intersection).dot(&axis);
        Some(UnitDelta {
            translation,
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            intersection: hit,
        })
    }

    fn feedback(&self) -> UnitFeedback {
        self.feedback
    }

    fn set_highlighted(&mut self, highlighted: bool) {
        self.feedback = if highlighted {
            UnitFeedback::Highlighted
        } else {
            UnitFeedback::Idle
        };
    }

    fn set_faded(&mut self) {
        self.feedback = UnitFeedback::Faded;
    }
}

/// Circular handle that turns the selection about one axis.
///
/// The rotation angle is measured between the previous and current hit
/// points as seen from the ring's origin, signed by the ring axis. Steps
/// compose: a drag that comes back to its start has rotated the selection
/// by a net zero angle.
pub struct RotationRing {
    axis: Unit<Vector3<f64>>,
    origin: Point3<f64>,
    feedback: UnitFeedback,
}

impl RotationRing {
    pub fn new(axis: Unit<Vector3<f64>>) -> Self {
        RotationRing {
            axis,
            origin: Point3::origin(),
            feedback: UnitFeedback::Idle,
        }
    }
}

impl ControlUnit for RotationRing {
    fn delta(
        &self,
        old_intersection: &Point3<f64>,
        pointer: &Ray,
        drag_plane: &Plane,
        frame: &UnitQuaternion<f64>,
    ) -> Option<UnitDelta> {
        let hit = pointer.intersect_plane(drag_plane)?;
        let axis = Unit::new_normalize(frame * self.axis.into_inner());
        let previous = old_intersection - self.origin;
        let current = hit - self.origin;
        // Signed angle between the two spokes about the ring axis.
        let angle = previous
            .cross(&current)
            .dot(&axis.into_inner())
            .atan2(previous.dot(&current));
        Some(UnitDelta {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::from_axis_angle(&axis, angle),
            scale: Vector3::new(1.0, 1.0, 1.0),
            intersection: hit,
        })
    }

    fn feedback(&self) -> UnitFeedback {
        self.feedback
    }

    fn set_highlighted(&mut self, highlighted: bool) {
        self.feedback = if highlighted {
            UnitFeedback::Highlighted
        } else {
            UnitFeedback::Idle
        };
    }

    fn set_faded(&mut self) {
        self.feedback = UnitFeedback::Faded;
    }

    fn set_origin(&mut self, origin: Point3<f64>) {
        self.origin = origin;
    }
}
