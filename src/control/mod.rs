//! Interactive transform controller: converts pointer-drag geometry into
//! incremental translation/rotation/scale deltas and applies them uniformly
//! to the current label selection.
//!
//! The controller owns a set of control units (axis handles, rotation
//! rings). The caller hit-tests pointer rays against the rendered handles
//! and reports the result as an [`Intersection`]; at most one unit is
//! highlighted at a time, all others are faded. A press establishes a drag
//! plane through the last intersection point, oriented by the camera's view
//! direction at drag start; every subsequent move asks the highlighted unit
//! for a delta against that plane. Deltas are strictly incremental, frame to
//! frame, never absolute from drag start.

use crate::camera::PinholeCamera;
use crate::geometry::{Plane, Ray};
use crate::label::{Drawable, LabelArena};
use log::debug;
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

pub mod units;

pub use units::{RotationRing, TranslationAxis};

/// A caller-resolved hit on one control unit.
#[derive(Debug, Clone)]
pub struct Intersection {
    /// Index of the hit unit in the controller's unit list.
    pub unit: usize,
    /// World-space hit point.
    pub point: Point3<f64>,
}

/// Incremental transform produced by one pointer-move step.
#[derive(Debug, Clone)]
pub struct UnitDelta {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
    /// Where the drag plane was hit this step; becomes the next step's
    /// reference point.
    pub intersection: Point3<f64>,
}

/// Visual state of a control unit, for handle rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFeedback {
    Idle,
    Highlighted,
    Faded,
}

/// One interactive affordance: an axis, a ring, etc.
pub trait ControlUnit {
    /// Incremental delta for a pointer step: previous intersection point,
    /// new pointer ray, and the session's drag plane. `None` when the ray
    /// misses the drag plane (the event is still consumed, nothing moves).
    fn delta(
        &self,
        old_intersection: &Point3<f64>,
        pointer: &Ray,
        drag_plane: &Plane,
        frame: &UnitQuaternion<f64>,
    ) -> Option<UnitDelta>;

    fn feedback(&self) -> UnitFeedback;

    fn set_highlighted(&mut self, highlighted: bool);

    fn set_faded(&mut self);

    /// Re-anchors the unit to the controlled selection's origin. Units that
    /// do not care about the origin ignore this.
    fn set_origin(&mut self, _origin: Point3<f64>) {}
}

/// Per-gesture drag state plus the persistent control units.
pub struct TransformController {
    units: Vec<Box<dyn ControlUnit>>,
    highlighted_unit: Option<usize>,
    local: bool,
    apply_scale: bool,
    intersection: Point3<f64>,
    drag_plane: Option<Plane>,
    origin: Point3<f64>,
    orientation: UnitQuaternion<f64>,
}

impl TransformController {
    /// Standard handle set: one translation axis and one rotation ring per
    /// world axis.
    pub fn new() -> Self {
        let units: Vec<Box<dyn ControlUnit>> = vec![
            Box::new(TranslationAxis::new(Vector3::x_axis())),
            Box::new(TranslationAxis::new(Vector3::y_axis())),
            Box::new(TranslationAxis::new(Vector3::z_axis())),
            Box::new(RotationRing::new(Vector3::x_axis())),
            Box::new(RotationRing::new(Vector3::y_axis())),
            Box::new(RotationRing::new(Vector3::z_axis())),
        ];
        TransformController {
            units,
            highlighted_unit: None,
            local: true,
            apply_scale: false,
            intersection: Point3::origin(),
            drag_plane: None,
            origin: Point3::origin(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Controller built from an explicit unit list, for tests and custom
    /// handle sets.
    pub fn with_units(units: Vec<Box<dyn ControlUnit>>) -> Self {
        let mut controller = TransformController::new();
        controller.units = units;
        controller
    }

    /// Whether scale deltas from control units are applied to labels.
    /// Disabled by default.
    pub fn set_apply_scale(&mut self, apply: bool) {
        self.apply_scale = apply;
    }

    pub fn highlighted(&self) -> bool {
        self.highlighted_unit.is_some()
    }

    pub fn is_local_frame(&self) -> bool {
        self.local
    }

    /// Per-unit visual state for handle rendering.
    pub fn feedback(&self) -> Vec<UnitFeedback> {
        self.units.iter().map(|u| u.feedback()).collect()
    }

    /// Anchors the controller to the selection's pivot: handle origin and
    /// the orientation used for local-frame deltas.
    pub fn attach(&mut self, origin: Point3<f64>, orientation: UnitQuaternion<f64>) {
        self.origin = origin;
        self.orientation = orientation;
        for unit in &mut self.units {
            unit.set_origin(origin);
        }
    }

    /// Applies a hit-test result: the hit unit (if any) is highlighted, all
    /// other units are faded; no hit clears every unit.
    pub fn set_highlighted(&mut self, hit: Option<Intersection>) {
        self.highlighted_unit = None;
        match hit {
            Some(hit) if hit.unit < self.units.len() => {
                for (index, unit) in self.units.iter_mut().enumerate() {
                    if index == hit.unit {
                        unit.set_highlighted(true);
                    } else {
                        unit.set_faded();
                    }
                }
                self.highlighted_unit = Some(hit.unit);
                self.intersection = hit.point;
            }
            _ => {
                for unit in &mut self.units {
                    unit.set_highlighted(false);
                }
            }
        }
    }

    /// Starts a drag session if a unit is highlighted: the drag plane passes
    /// through the stored intersection point and faces the camera's current
    /// view direction, so it tracks viewpoint rather than geometry.
    pub fn on_mouse_down(&mut self, camera: &PinholeCamera) -> bool {
        if self.highlighted_unit.is_none() {
            return false;
        }
        let normal = Unit::new_normalize(camera.view_direction());
        self.drag_plane = Some(Plane::from_normal_and_point(normal, &self.intersection));
        debug!("drag session started at {:?}", self.intersection);
        true
    }

    /// Advances an active drag: asks the highlighted unit for an incremental
    /// delta and applies it uniformly to every currently selected label.
    /// Returns whether the event was consumed.
    pub fn on_mouse_move(&mut self, pointer: &Ray, arena: &mut LabelArena) -> bool {
        let (Some(unit_index), Some(drag_plane)) = (self.highlighted_unit, &self.drag_plane)
        else {
            return false;
        };
        let frame = if self.local {
            self.orientation
        } else {
            UnitQuaternion::identity()
        };
        let Some(delta) = self.units[unit_index].delta(
            &self.intersection,
            pointer,
            drag_plane,
            &frame,
        ) else {
            return true;
        };

        // A label deselected mid-drag stops receiving deltas immediately.
        for id in arena.selection().to_vec() {
            if !arena.contains(id) {
                continue;
            }
            let _ = arena.translate(id, &delta.translation);
            let _ = arena.rotate(id, &delta.rotation);
            if self.apply_scale {
                let _ = arena.scale(id, &delta.scale, &self.origin);
            }
        }

        self.intersection = delta.intersection;
        true
    }

    /// Ends the drag session. Persistence of the result is a collaborator
    /// concern.
    pub fn on_mouse_up(&mut self) {
        self.drag_plane = None;
    }

    /// Switches between local and world reference frames for subsequent
    /// deltas; no-op while nothing is selected.
    pub fn toggle_frame(&mut self, arena: &LabelArena) {
        if !arena.selection().is_empty() {
            self.local = !self.local;
        }
    }
}

impl Default for TransformController {
    fn default() -> Self {
        TransformController::new()
    }
}
