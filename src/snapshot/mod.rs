//! Read-only snapshot types mirroring the external application store.
//!
//! The geometry core never owns the authoritative state. Each frame it receives
//! an immutable [`StoreSnapshot`] and resynchronizes its drawables from it.
//! Writes travel the other way as [`ShapeCommit`] intents which a collaborator
//! applies through the store's mutation pipeline.
//!
//! All types here are plain-data and serde round-trippable, so snapshots can be
//! captured, replayed, and diffed in tests.

use nalgebra::{Point3, Quaternion, Unit, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel id for "no parent" / "not yet committed".
pub const NO_ID: i64 = -1;

/// Plain 2-vector as stored by the application state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2Data {
    pub x: f64,
    pub y: f64,
}

impl Vec2Data {
    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Plain 3-vector as stored by the application state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3Data {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3Data {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3Data { x, y, z }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn to_point(self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Vec3Data::new(v.x, v.y, v.z)
    }

    pub fn from_point(p: &Point3<f64>) -> Self {
        Vec3Data::new(p.x, p.y, p.z)
    }
}

/// Plain quaternion (x, y, z, w) as stored by the application state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for QuaternionData {
    fn default() -> Self {
        QuaternionData {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl QuaternionData {
    pub fn to_unit_quaternion(self) -> UnitQuaternion<f64> {
        Unit::new_normalize(Quaternion::new(self.w, self.x, self.y, self.z))
    }

    pub fn from_unit_quaternion(q: &UnitQuaternion<f64>) -> Self {
        QuaternionData {
            x: q.i,
            y: q.j,
            z: q.k,
            w: q.w,
        }
    }
}

/// Pinhole intrinsics as stored per sensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntrinsicsData {
    pub focal_length: Vec2Data,
    pub focal_center: Vec2Data,
}

/// Sensor pose as stored per sensor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtrinsicsData {
    pub translation: Vec3Data,
    pub rotation: QuaternionData,
}

/// One sensor entry; either calibration block may be absent for uncalibrated
/// sensors, in which case dependent geometry degrades to pass-through display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub intrinsics: Option<IntrinsicsData>,
    pub extrinsics: Option<ExtrinsicsData>,
}

/// Closed set of shape geometries understood by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Grid,
    Cuboid,
}

/// Persisted geometry of a single shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeSnapshot {
    Grid {
        center: Vec3Data,
        rotation: QuaternionData,
        scale: Vec3Data,
    },
    Cuboid {
        center: Vec3Data,
        rotation: QuaternionData,
        dimensions: Vec3Data,
    },
}

impl ShapeSnapshot {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeSnapshot::Grid { .. } => ShapeKind::Grid,
            ShapeSnapshot::Cuboid { .. } => ShapeKind::Cuboid,
        }
    }
}

/// Closed set of label variants understood by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Plane3d,
    Box3d,
}

/// Persisted state of one label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSnapshot {
    pub id: i64,
    pub item: usize,
    pub kind: LabelKind,
    /// Track id; [`NO_ID`] when the label is not part of a track.
    #[serde(default = "no_id")]
    pub track: i64,
    #[serde(default)]
    pub category: Vec<usize>,
    #[serde(default)]
    pub attributes: HashMap<u64, Vec<u64>>,
    /// Parent label id; [`NO_ID`] for roots.
    #[serde(default = "no_id")]
    pub parent: i64,
    #[serde(default)]
    pub children: Vec<i64>,
    /// Ids of the shapes owned by this label.
    pub shapes: Vec<i64>,
    #[serde(default)]
    pub sensors: Vec<usize>,
}

fn no_id() -> i64 {
    NO_ID
}

/// Labels and shapes of a single frame/item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub labels: HashMap<i64, LabelSnapshot>,
    pub shapes: HashMap<i64, ShapeSnapshot>,
}

/// Current user selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub item: usize,
    pub sensor: usize,
    pub labels: Vec<i64>,
}

/// Viewer configuration relevant to the bird's-eye view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub sensor: usize,
    /// How far above the reference plane the synthetic camera sits.
    pub distance: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            sensor: 0,
            distance: 10.0,
        }
    }
}

/// Immutable per-frame view of everything the geometry core reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub items: Vec<ItemSnapshot>,
    pub sensors: HashMap<usize, SensorSnapshot>,
    #[serde(default)]
    pub select: Selection,
    #[serde(default = "ViewerConfig::default")]
    pub viewer: ViewerConfig,
}

impl StoreSnapshot {
    /// Look up a label in an item, if present.
    pub fn label(&self, item: usize, label_id: i64) -> Option<&LabelSnapshot> {
        self.items.get(item)?.labels.get(&label_id)
    }

    /// Look up a shape in an item, if present.
    pub fn shape(&self, item: usize, shape_id: i64) -> Option<&ShapeSnapshot> {
        self.items.get(item)?.shapes.get(&shape_id)
    }
}

/// Outgoing mutation intent: the finalized shape parameters of one label,
/// ready for the store's commit pipeline. The core emits these; it never
/// writes the store itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeCommit {
    pub label_id: i64,
    pub shape_ids: Vec<i64>,
    pub kinds: Vec<ShapeKind>,
    pub shapes: Vec<ShapeSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut item = ItemSnapshot::default();
        item.labels.insert(
            3,
            LabelSnapshot {
                id: 3,
                item: 0,
                kind: LabelKind::Plane3d,
                track: NO_ID,
                category: vec![1],
                attributes: HashMap::new(),
                parent: NO_ID,
                children: vec![7],
                shapes: vec![10],
                sensors: vec![0],
            },
        );
        item.shapes.insert(
            10,
            ShapeSnapshot::Grid {
                center: Vec3Data::new(0.0, 0.0, 5.0),
                rotation: QuaternionData::default(),
                scale: Vec3Data::new(1.0, 1.0, 1.0),
            },
        );
        let snapshot = StoreSnapshot {
            items: vec![item],
            sensors: HashMap::new(),
            select: Selection {
                item: 0,
                sensor: 0,
                labels: vec![3],
            },
            viewer: ViewerConfig::default(),
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: StoreSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.items.len(), 1);
        let label = parsed.label(0, 3).unwrap();
        assert_eq!(label.kind, LabelKind::Plane3d);
        assert_eq!(label.children, vec![7]);
        let shape = parsed.shape(0, 10).unwrap();
        assert_eq!(shape.kind(), ShapeKind::Grid);
    }

    #[test]
    fn test_quaternion_data_normalizes() {
        let q = QuaternionData {
            x: 0.0,
            y: 0.0,
            z: 2.0,
            w: 0.0,
        };
        let unit = q.to_unit_quaternion();
        assert!((unit.norm() - 1.0).abs() < 1e-12);
        let rotated = unit * Vector3::x();
        assert!((rotated.x + 1.0).abs() < 1e-12);
    }
}
