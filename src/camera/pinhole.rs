//! Implements the pinhole camera model with extrinsic pose.
//!
//! This module provides the [`PinholeCamera`] struct used throughout the
//! bird's-eye pipeline. It combines the classic pinhole intrinsic projection
//! (focal length, principal point, no distortion) with an extrinsic pose
//! (translation + unit quaternion) so that points can be mapped between world
//! space and pixel coordinates, and pixels can be lifted back to world rays
//! for pointer interaction.
//!
//! Intrinsic values are kept in raw pixel units; they are never normalized by
//! the image dimensions. All derived matrices follow that convention.

use crate::camera::{validation, CameraModelError, Extrinsics, Intrinsics, Resolution};
use crate::geometry::Ray;
use crate::snapshot::SensorSnapshot;
use nalgebra::{Matrix3, Matrix4, Point3, Unit, UnitQuaternion, Vector2, Vector3};
use std::fs;
use std::io::Write;
use yaml_rust::YamlLoader;

/// A pinhole camera with optional intrinsics and a world-space pose.
///
/// A camera without intrinsics is in the *no-projection* state: pixel-related
/// queries return [`CameraModelError::MissingIntrinsics`], and dependent
/// computations (the homography engine) degrade to pass-through display
/// instead of failing.
///
/// # Examples
///
/// ```rust
/// use birdseye_tools::camera::{PinholeCamera, Resolution};
/// use nalgebra::Point3;
///
/// let mut camera = PinholeCamera::new(Resolution { width: 100, height: 100 });
/// assert!(!camera.has_projection());
///
/// camera.set_intrinsics((100.0, 100.0), (50.0, 50.0)).unwrap();
/// let pixel = camera.world_to_pixel(&Point3::new(0.0, 0.0, 5.0)).unwrap();
/// assert!((pixel.x - 50.0).abs() < 1e-9);
/// assert!((pixel.y - 50.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    intrinsics: Option<Intrinsics>,
    extrinsics: Extrinsics,
    /// The resolution of the source image, [`Resolution`] (width, height).
    pub resolution: Resolution,
    intrinsic_matrix: Option<Matrix3<f64>>,
    intrinsic_inverse: Option<Matrix3<f64>>,
}

impl PinholeCamera {
    /// Creates a camera in the no-projection state with identity pose.
    pub fn new(resolution: Resolution) -> Self {
        PinholeCamera {
            intrinsics: None,
            extrinsics: Extrinsics::default(),
            resolution,
            intrinsic_matrix: None,
            intrinsic_inverse: None,
        }
    }

    /// Creates a fully parameterized camera, validating all inputs.
    pub fn with_params(
        intrinsics: Intrinsics,
        extrinsics: Extrinsics,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let mut camera = PinholeCamera::new(resolution);
        camera.set_intrinsics(
            (intrinsics.fx, intrinsics.fy),
            (intrinsics.cx, intrinsics.cy),
        )?;
        camera.set_extrinsics(extrinsics.translation, extrinsics.rotation)?;
        Ok(camera)
    }

    /// Builds a camera from a store sensor entry. A sensor without an
    /// intrinsics block yields a no-projection camera; a sensor without an
    /// extrinsics block gets the identity pose.
    pub fn from_sensor(
        sensor: &SensorSnapshot,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let mut camera = PinholeCamera::new(resolution);
        if let Some(intrinsics) = &sensor.intrinsics {
            let focal_length = intrinsics.focal_length.to_vector();
            let focal_center = intrinsics.focal_center.to_vector();
            camera.set_intrinsics(
                (focal_length.x, focal_length.y),
                (focal_center.x, focal_center.y),
            )?;
        }
        if let Some(extrinsics) = &sensor.extrinsics {
            camera.set_extrinsics(
                extrinsics.translation.to_vector(),
                extrinsics.rotation.to_unit_quaternion(),
            )?;
        }
        Ok(camera)
    }

    /// Sets the intrinsic parameters and eagerly recomputes the derived
    /// intrinsic matrix and its inverse, so reads always reflect the latest
    /// write.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    /// * [`CameraModelError::SingularIntrinsicMatrix`]
    pub fn set_intrinsics(
        &mut self,
        focal_length: (f64, f64),
        focal_center: (f64, f64),
    ) -> Result<(), CameraModelError> {
        let intrinsics = Intrinsics {
            fx: focal_length.0,
            fy: focal_length.1,
            cx: focal_center.0,
            cy: focal_center.1,
        };
        validation::validate_intrinsics(&intrinsics)?;

        // Row-major [[fx, 0, cx], [0, fy, cy], [0, 0, 1]] in pixel units.
        let matrix = Matrix3::new(
            intrinsics.fx,
            0.0,
            intrinsics.cx,
            0.0,
            intrinsics.fy,
            intrinsics.cy,
            0.0,
            0.0,
            1.0,
        );
        let inverse = matrix
            .try_inverse()
            .ok_or(CameraModelError::SingularIntrinsicMatrix)?;

        self.intrinsics = Some(intrinsics);
        self.intrinsic_matrix = Some(matrix);
        self.intrinsic_inverse = Some(inverse);
        Ok(())
    }

    /// Sets the camera pose.
    pub fn set_extrinsics(
        &mut self,
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Result<(), CameraModelError> {
        let extrinsics = Extrinsics {
            translation,
            rotation,
        };
        validation::validate_extrinsics(&extrinsics)?;
        self.extrinsics = extrinsics;
        Ok(())
    }

    /// Whether intrinsics are present, i.e. pixel projections are defined.
    pub fn has_projection(&self) -> bool {
        self.intrinsics.is_some()
    }

    pub fn intrinsics(&self) -> Option<&Intrinsics> {
        self.intrinsics.as_ref()
    }

    pub fn extrinsics(&self) -> &Extrinsics {
        &self.extrinsics
    }

    /// The derived intrinsic matrix, `None` in the no-projection state.
    pub fn intrinsic_matrix(&self) -> Option<&Matrix3<f64>> {
        self.intrinsic_matrix.as_ref()
    }

    /// The derived inverse intrinsic matrix, `None` in the no-projection state.
    pub fn intrinsic_inverse(&self) -> Option<&Matrix3<f64>> {
        self.intrinsic_inverse.as_ref()
    }

    /// Camera position in world space.
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.extrinsics.translation)
    }

    /// The camera's forward axis `(0, 0, 1)` rotated into world space.
    pub fn view_direction(&self) -> Vector3<f64> {
        self.extrinsics.rotation * Vector3::z()
    }

    /// Transforms a world point into camera coordinates.
    pub fn world_to_camera(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.extrinsics.rotation.inverse() * (point - Point3::from(self.extrinsics.translation))
    }

    /// Projects a 3D point in camera coordinates to pixel coordinates:
    /// `u = fx·X/Z + cx`, `v = fy·Y/Z + cy`.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::MissingIntrinsics`] in the no-projection state.
    /// * [`CameraModelError::PointAtCameraCenter`] if Z is too close to zero.
    /// * [`CameraModelError::ProjectionOutSideImage`] if the pixel is outside
    ///   the image bounds.
    pub fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let intrinsics = self
            .intrinsics
            .as_ref()
            .ok_or(CameraModelError::MissingIntrinsics)?;

        // If z is very small, the point is at the camera center
        if point_3d.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }
        let u: f64 = intrinsics.fx * point_3d.x / point_3d.z + intrinsics.cx;
        let v: f64 = intrinsics.fy * point_3d.y / point_3d.z + intrinsics.cy;

        if u < 0.0
            || u >= self.resolution.width as f64
            || v < 0.0
            || v >= self.resolution.height as f64
        {
            return Err(CameraModelError::ProjectionOutSideImage);
        }

        Ok(Vector2::new(u, v))
    }

    /// Unprojects a pixel to a normalized 3D ray direction in camera
    /// coordinates: `((u − cx)/fx, (v − cy)/fy, 1)`, normalized.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::MissingIntrinsics`] in the no-projection state.
    /// * [`CameraModelError::PointIsOutSideImage`] if the pixel is outside
    ///   the image bounds.
    pub fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        let intrinsics = self
            .intrinsics
            .as_ref()
            .ok_or(CameraModelError::MissingIntrinsics)?;

        if point_2d.x < 0.0
            || point_2d.x >= self.resolution.width as f64
            || point_2d.y < 0.0
            || point_2d.y >= self.resolution.height as f64
        {
            return Err(CameraModelError::PointIsOutSideImage);
        }

        let mx: f64 = (point_2d.x - intrinsics.cx) / intrinsics.fx;
        let my: f64 = (point_2d.y - intrinsics.cy) / intrinsics.fy;

        let r2: f64 = mx * mx + my * my;

        let norm: f64 = (1.0 + r2).sqrt();
        let norm_inv: f64 = 1.0 / norm;

        Ok(Vector3::new(mx * norm_inv, my * norm_inv, norm_inv))
    }

    /// Projects a world point to pixel coordinates: extrinsics inverse, then
    /// intrinsic projection. Used for overlaying 3D labels on the 2D image.
    pub fn world_to_pixel(&self, point: &Point3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let camera_point = self.world_to_camera(point);
        self.project(&camera_point)
    }

    /// Lifts a pixel to a world-space ray from the camera center, for
    /// pointer hit-testing and drag interaction.
    pub fn pixel_to_world_ray(&self, pixel: &Vector2<f64>) -> Result<Ray, CameraModelError> {
        let direction_cam = self.unproject(pixel)?;
        let direction = self.extrinsics.rotation * direction_cam;
        Ok(Ray::new(self.position(), Unit::new_normalize(direction)))
    }

    /// Perspective projection matrix for a 3D renderer, matching the
    /// intrinsic matrix's field of view exactly so 3D-over-image overlays
    /// align pixel for pixel.
    ///
    /// Camera space is x-right, y-down, z-forward. For a camera point
    /// `(X, Y, Z)` the resulting clip coordinates satisfy
    /// `ndc_x = 2·u/width − 1` where `u` is the [`Self::project`] pixel
    /// column (and likewise for rows).
    ///
    /// Returns `None` in the no-projection state.
    pub fn projection_matrix(&self, near: f64, far: f64) -> Option<Matrix4<f64>> {
        let intrinsics = self.intrinsics.as_ref()?;
        let w = self.resolution.width as f64;
        let h = self.resolution.height as f64;
        let depth = far - near;
        Some(Matrix4::new(
            2.0 * intrinsics.fx / w,
            0.0,
            2.0 * intrinsics.cx / w - 1.0,
            0.0,
            0.0,
            2.0 * intrinsics.fy / h,
            2.0 * intrinsics.cy / h - 1.0,
            0.0,
            0.0,
            0.0,
            (far + near) / depth,
            -2.0 * far * near / depth,
            0.0,
            0.0,
            1.0,
            0.0,
        ))
    }

    /// Loads camera parameters from a YAML file.
    ///
    /// The document follows the `cam0` convention: an `intrinsics` array
    /// `[fx, fy, cx, cy]`, a `resolution` array `[width, height]`, and an
    /// optional `extrinsics` block with `translation: [x, y, z]` and
    /// `rotation: [w, x, y, z]`.
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = &docs[0];

        let intrinsics_yaml = doc["cam0"]["intrinsics"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'intrinsics' or not an array".to_string())
        })?;
        let resolution_yaml = doc["cam0"]["resolution"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'resolution' or not an array".to_string())
        })?;

        let read_f64 = |node: &yaml_rust::Yaml, name: &str| {
            node.as_f64()
                .or_else(|| node.as_i64().map(|v| v as f64))
                .ok_or_else(|| {
                    CameraModelError::InvalidParams(format!("Invalid {name}: not a float"))
                })
        };

        let intrinsics = Intrinsics {
            fx: read_f64(&intrinsics_yaml[0], "fx")?,
            fy: read_f64(&intrinsics_yaml[1], "fy")?,
            cx: read_f64(&intrinsics_yaml[2], "cx")?,
            cy: read_f64(&intrinsics_yaml[3], "cy")?,
        };

        let resolution = Resolution {
            width: resolution_yaml[0].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid width: not an integer".to_string())
            })? as u32,
            height: resolution_yaml[1].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid height: not an integer".to_string())
            })? as u32,
        };

        let mut extrinsics = Extrinsics::default();
        let extrinsics_yaml = &doc["cam0"]["extrinsics"];
        if !extrinsics_yaml.is_badvalue() {
            let translation = extrinsics_yaml["translation"].as_vec().ok_or_else(|| {
                CameraModelError::InvalidParams(
                    "YAML missing 'translation' or not an array".to_string(),
                )
            })?;
            let rotation = extrinsics_yaml["rotation"].as_vec().ok_or_else(|| {
                CameraModelError::InvalidParams(
                    "YAML missing 'rotation' or not an array".to_string(),
                )
            })?;
            extrinsics.translation = Vector3::new(
                read_f64(&translation[0], "translation.x")?,
                read_f64(&translation[1], "translation.y")?,
                read_f64(&translation[2], "translation.z")?,
            );
            extrinsics.rotation = Unit::new_normalize(nalgebra::Quaternion::new(
                read_f64(&rotation[0], "rotation.w")?,
                read_f64(&rotation[1], "rotation.x")?,
                read_f64(&rotation[2], "rotation.y")?,
                read_f64(&rotation[3], "rotation.z")?,
            ));
        }

        PinholeCamera::with_params(intrinsics, extrinsics, resolution)
    }

    /// Saves the camera's parameters to a YAML file in the `cam0` layout
    /// accepted by [`Self::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let intrinsics = self
            .intrinsics
            .as_ref()
            .ok_or(CameraModelError::MissingIntrinsics)?;
        let rotation = &self.extrinsics.rotation;

        let yaml = serde_yaml::to_value(serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("cam0".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                (
                    serde_yaml::Value::String("camera_model".to_string()),
                    serde_yaml::Value::String("pinhole".to_string()),
                ),
                (
                    serde_yaml::Value::String("intrinsics".to_string()),
                    serde_yaml::to_value(vec![
                        intrinsics.fx,
                        intrinsics.fy,
                        intrinsics.cx,
                        intrinsics.cy,
                    ])
                    .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
                (
                    serde_yaml::Value::String("resolution".to_string()),
                    serde_yaml::to_value(vec![self.resolution.width, self.resolution.height])
                        .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
                (
                    serde_yaml::Value::String("extrinsics".to_string()),
                    serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                        (
                            serde_yaml::Value::String("translation".to_string()),
                            serde_yaml::to_value(vec![
                                self.extrinsics.translation.x,
                                self.extrinsics.translation.y,
                                self.extrinsics.translation.z,
                            ])
                            .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                        ),
                        (
                            serde_yaml::Value::String("rotation".to_string()),
                            serde_yaml::to_value(vec![
                                rotation.w, rotation.i, rotation.j, rotation.k,
                            ])
                            .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                        ),
                    ]))
                    .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
            ]))
            .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
        )]))
        .map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let yaml_string =
            serde_yaml::to_string(&yaml).map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let mut file =
            fs::File::create(path).map_err(|e| CameraModelError::IOError(e.to_string()))?;

        file.write_all(yaml_string.as_bytes())
            .map_err(|e| CameraModelError::IOError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> PinholeCamera {
        let mut camera = PinholeCamera::new(Resolution {
            width: 752,
            height: 480,
        });
        camera
            .set_intrinsics((461.629, 460.152), (362.680, 246.049))
            .unwrap();
        camera
    }

    #[test]
    fn test_intrinsic_matrix_inverse_round_trip() {
        let camera = test_camera();
        let product = camera.intrinsic_matrix().unwrap() * camera.intrinsic_inverse().unwrap();
        assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_no_projection_state() {
        let camera = PinholeCamera::new(Resolution {
            width: 640,
            height: 480,
        });
        assert!(!camera.has_projection());
        assert!(camera.intrinsic_matrix().is_none());
        assert!(matches!(
            camera.world_to_pixel(&Point3::new(0.0, 0.0, 1.0)),
            Err(CameraModelError::MissingIntrinsics)
        ));
    }

    #[test]
    fn test_set_intrinsics_rejects_zero_focal() {
        let mut camera = PinholeCamera::new(Resolution {
            width: 640,
            height: 480,
        });
        assert!(matches!(
            camera.set_intrinsics((0.0, 100.0), (320.0, 240.0)),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));
        assert!(!camera.has_projection());
    }

    #[test]
    fn test_from_sensor_states() {
        let resolution = Resolution {
            width: 640,
            height: 480,
        };
        let blind = SensorSnapshot::default();
        let camera = PinholeCamera::from_sensor(&blind, resolution.clone()).unwrap();
        assert!(!camera.has_projection());

        let calibrated = SensorSnapshot {
            intrinsics: Some(crate::snapshot::IntrinsicsData {
                focal_length: crate::snapshot::Vec2Data { x: 100.0, y: 100.0 },
                focal_center: crate::snapshot::Vec2Data { x: 320.0, y: 240.0 },
            }),
            extrinsics: None,
        };
        let camera = PinholeCamera::from_sensor(&calibrated, resolution).unwrap();
        assert!(camera.has_projection());
        // No extrinsics block falls back to the identity pose.
        assert_relative_eq!(
            camera.extrinsics().translation,
            Vector3::zeros(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let camera = test_camera();

        let point_3d = Vector3::new(1.0, 1.0, 5.0);
        let norm_3d = point_3d.normalize();

        let point_2d = camera.project(&point_3d).unwrap();
        let point_3d_unprojected = camera.unproject(&point_2d).unwrap();

        assert_relative_eq!(norm_3d, point_3d_unprojected, epsilon = 1e-6);
    }

    #[test]
    fn test_world_to_pixel_with_pose() {
        let mut camera = test_camera();
        // Camera moved one unit back along its own forward axis; a point that
        // was at z=4 in front is now at z=5.
        camera
            .set_extrinsics(Vector3::new(0.0, 0.0, -1.0), UnitQuaternion::identity())
            .unwrap();

        let fixed = camera.world_to_pixel(&Point3::new(1.0, 1.0, 4.0)).unwrap();
        let direct = camera.project(&Vector3::new(1.0, 1.0, 5.0)).unwrap();
        assert_relative_eq!(fixed, direct, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_to_world_ray_hits_source_point() {
        let mut camera = test_camera();
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.3);
        camera
            .set_extrinsics(Vector3::new(1.0, -2.0, 0.5), rotation)
            .unwrap();

        let target = Point3::new(1.5, -1.0, 6.0);
        let pixel = camera.world_to_pixel(&target).unwrap();
        let ray = camera.pixel_to_world_ray(&pixel).unwrap();

        // The ray must pass through the original world point.
        let to_target = target - ray.origin;
        let along = ray.direction.into_inner() * to_target.norm();
        assert_relative_eq!(to_target, along, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_matrix_matches_intrinsics() {
        let camera = test_camera();
        let projection = camera.projection_matrix(0.1, 100.0).unwrap();

        let point = Vector3::new(0.4, -0.2, 7.0);
        let clip = projection * nalgebra::Vector4::new(point.x, point.y, point.z, 1.0);
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;

        let pixel = camera.project(&point).unwrap();
        let w = camera.resolution.width as f64;
        let h = camera.resolution.height as f64;
        assert_relative_eq!(ndc_x, 2.0 * pixel.x / w - 1.0, epsilon = 1e-9);
        assert_relative_eq!(ndc_y, 2.0 * pixel.y / h - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut camera = test_camera();
        camera
            .set_extrinsics(
                Vector3::new(0.3, -1.2, 4.0),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7),
            )
            .unwrap();

        let path = std::env::temp_dir().join("birdseye_pinhole_round_trip.yaml");
        let path = path.to_str().unwrap().to_string();
        camera.save_to_yaml(&path).unwrap();
        let loaded = PinholeCamera::load_from_yaml(&path).unwrap();

        let original = camera.intrinsics().unwrap();
        let reloaded = loaded.intrinsics().unwrap();
        assert_relative_eq!(original.fx, reloaded.fx, epsilon = 1e-9);
        assert_relative_eq!(original.cy, reloaded.cy, epsilon = 1e-9);
        assert_relative_eq!(
            camera.extrinsics().translation,
            loaded.extrinsics().translation,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            camera.extrinsics().rotation.angle_to(&loaded.extrinsics().rotation),
            0.0,
            epsilon = 1e-9
        );
    }
}
