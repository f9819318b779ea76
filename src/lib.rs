//! Bird's-Eye Tools Library
//!
//! A Rust library for plane-induced homography rendering and interactive
//! 3D label editing on top of calibrated pinhole cameras. It provides:
//! - Pinhole camera model with intrinsic/extrinsic calibration
//! - Plane-induced homography derivation and CPU bird's-eye resampling
//! - A hierarchical 3D label scene graph (plane and box labels)
//! - An interactive controller turning pointer drags into transform deltas
//!
//! Camera calibration can be loaded from and saved to YAML files, and the
//! label graph synchronizes against serialized store snapshots.

pub mod camera;
pub mod control;
pub mod geometry;
pub mod homography;
pub mod label;
pub mod snapshot;

// Re-export commonly used types
pub use camera::{CameraModelError, Extrinsics, Intrinsics, PinholeCamera, Resolution};

pub use control::{ControlUnit, RotationRing, TransformController, TranslationAxis, UnitDelta};

pub use geometry::{Plane, Ray};

pub use homography::{BirdsEyeState, BirdsEyeView, HomographyError, PlaneReference, ViewOutput};

pub use label::{BoxLabel, Drawable, Label, LabelArena, LabelError, PlaneLabel};

pub use snapshot::{LabelSnapshot, SensorSnapshot, ShapeSnapshot, StoreSnapshot, NO_ID};
