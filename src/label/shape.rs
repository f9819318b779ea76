//! Concrete shape geometry owned by labels.
//!
//! Shapes are plain world-space geometry records: a grid plane (extent +
//! pose) or a cuboid (extent + pose). Each shape carries its store id and a
//! back-reference to its owning label by id; shapes are never shared across
//! labels. Shapes are created when a label is initialized, mutated by the
//! translate/rotate/scale operations, and dropped with their label.

use crate::label::LabelError;
use crate::snapshot::{QuaternionData, ShapeKind, ShapeSnapshot, Vec3Data, NO_ID};
use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

/// A planar grid: the reference surface for bird's-eye reprojection and the
/// attachment target for ground-aligned child labels.
#[derive(Debug, Clone)]
pub struct GridPlane {
    id: i64,
    label_id: i64,
    pub center: Point3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

impl GridPlane {
    pub fn new(label_id: i64) -> Self {
        GridPlane {
            id: NO_ID,
            label_id,
            center: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Unit normal of the grid: its local z axis rotated into world space.
    pub fn normal(&self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.rotation * Vector3::z())
    }
}

/// An oriented box.
#[derive(Debug, Clone)]
pub struct Cuboid {
    id: i64,
    label_id: i64,
    pub center: Point3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub dimensions: Vector3<f64>,
}

impl Cuboid {
    pub fn new(label_id: i64) -> Self {
        Cuboid {
            id: NO_ID,
            label_id,
            center: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            dimensions: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// The box's up axis in world space.
    pub fn up(&self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.rotation * Vector3::z())
    }
}

/// Closed tagged-variant set of all shape geometries.
#[derive(Debug, Clone)]
pub enum Shape {
    Grid(GridPlane),
    Cuboid(Cuboid),
}

impl Shape {
    pub fn id(&self) -> i64 {
        match self {
            Shape::Grid(g) => g.id,
            Shape::Cuboid(c) => c.id,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Grid(_) => ShapeKind::Grid,
            Shape::Cuboid(_) => ShapeKind::Cuboid,
        }
    }

    /// Id of the owning label, for control attachment.
    pub fn label_id(&self) -> i64 {
        match self {
            Shape::Grid(g) => g.label_id,
            Shape::Cuboid(c) => c.label_id,
        }
    }

    pub(crate) fn set_label_id(&mut self, label_id: i64) {
        match self {
            Shape::Grid(g) => g.label_id = label_id,
            Shape::Cuboid(c) => c.label_id = label_id,
        }
    }

    pub fn center(&self) -> Point3<f64> {
        match self {
            Shape::Grid(g) => g.center,
            Shape::Cuboid(c) => c.center,
        }
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        match self {
            Shape::Grid(g) => g.rotation,
            Shape::Cuboid(c) => c.rotation,
        }
    }

    pub fn translate(&mut self, delta: &Vector3<f64>) {
        match self {
            Shape::Grid(g) => g.center += delta,
            Shape::Cuboid(c) => c.center += delta,
        }
    }

    /// Rotates the shape's orientation in place; the center is unchanged.
    pub fn rotate(&mut self, delta: &UnitQuaternion<f64>) {
        match self {
            Shape::Grid(g) => g.rotation = delta * g.rotation,
            Shape::Cuboid(c) => c.rotation = delta * c.rotation,
        }
    }

    /// Anchor-relative scale: the center moves away from `anchor`
    /// component-wise and the extent multiplies.
    pub fn scale(&mut self, factor: &Vector3<f64>, anchor: &Point3<f64>) {
        let rescale = |center: &mut Point3<f64>| {
            let offset = (*center - anchor).component_mul(factor);
            *center = anchor + offset;
        };
        match self {
            Shape::Grid(g) => {
                g.scale.component_mul_assign(factor);
                rescale(&mut g.center);
            }
            Shape::Cuboid(c) => {
                c.dimensions.component_mul_assign(factor);
                rescale(&mut c.center);
            }
        }
    }

    /// Persisted representation for the store commit pipeline.
    pub fn to_snapshot(&self) -> ShapeSnapshot {
        match self {
            Shape::Grid(g) => ShapeSnapshot::Grid {
                center: Vec3Data::from_point(&g.center),
                rotation: QuaternionData::from_unit_quaternion(&g.rotation),
                scale: Vec3Data::from_vector(&g.scale),
            },
            Shape::Cuboid(c) => ShapeSnapshot::Cuboid {
                center: Vec3Data::from_point(&c.center),
                rotation: QuaternionData::from_unit_quaternion(&c.rotation),
                dimensions: Vec3Data::from_vector(&c.dimensions),
            },
        }
    }

    /// Resyncs geometry from an authoritative store snapshot. Idempotent;
    /// fails fast when the store hands a shape of the wrong kind.
    pub fn update_from(&mut self, snapshot: &ShapeSnapshot, id: i64) -> Result<(), LabelError> {
        match (self, snapshot) {
            (
                Shape::Grid(g),
                ShapeSnapshot::Grid {
                    center,
                    rotation,
                    scale,
                },
            ) => {
                g.id = id;
                g.center = center.to_point();
                g.rotation = rotation.to_unit_quaternion();
                g.scale = scale.to_vector();
                Ok(())
            }
            (
                Shape::Cuboid(c),
                ShapeSnapshot::Cuboid {
                    center,
                    rotation,
                    dimensions,
                },
            ) => {
                c.id = id;
                c.center = center.to_point();
                c.rotation = rotation.to_unit_quaternion();
                c.dimensions = dimensions.to_vector();
                Ok(())
            }
            (shape, snapshot) => Err(LabelError::ShapeKindMismatch {
                expected: shape.kind(),
                actual: snapshot.kind(),
            }),
        }
    }
}
