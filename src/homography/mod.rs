//! Bird's-eye homography: re-projects a camera image onto a reference plane.
//!
//! Given a calibrated [`PinholeCamera`] and a reference plane (normal +
//! center, usually from the selected plane label's grid), this module derives
//! the 3×3 homography relating bird's-eye pixels to source-camera pixels and
//! drives the CPU resampling loop that builds the output raster.
//!
//! Convention (fixed, see the identity test below): all plane quantities are
//! transformed into camera space first, the camera-to-plane rotation carries
//! the *negated* plane normal onto the camera forward axis `(0, 0, 1)`, and
//! intrinsic values stay in raw pixel units throughout. A plane whose normal
//! faces the camera at exactly the viewing distance therefore yields the
//! identity homography.

use crate::camera::PinholeCamera;
use crate::geometry::rotation_carrying;
use crate::label::shape::GridPlane;
use crate::snapshot::ViewerConfig;
use image::RgbaImage;
use log::{debug, warn};
use nalgebra::{Matrix3, Point3, Unit, Vector3};

const DEGENERATE_EPS: f64 = 1e-9;

#[derive(thiserror::Error, Debug)]
pub enum HomographyError {
    #[error("Camera has no intrinsics")]
    MissingIntrinsics,
    #[error("Camera lies on the reference plane")]
    DegeneratePlane,
    #[error("Homography matrix is not invertible")]
    SingularHomography,
}

/// The reference plane in world space: a unit normal and a center point.
#[derive(Debug, Clone)]
pub struct PlaneReference {
    pub normal: Unit<Vector3<f64>>,
    pub center: Point3<f64>,
}

impl From<&GridPlane> for PlaneReference {
    fn from(grid: &GridPlane) -> Self {
        PlaneReference {
            normal: grid.normal(),
            center: grid.center,
        }
    }
}

/// Lifecycle of the bird's-eye view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirdsEyeState {
    /// No plane label selected; the source image is shown untransformed.
    NoPlane,
    /// A plane is selected but the camera is in the no-projection state.
    PlaneNoIntrinsics,
    /// Homography inputs are complete; resampling is active.
    Ready,
}

/// Per-frame instruction for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutput {
    /// Draw this resampled raster.
    Raster(RgbaImage),
    /// Draw the plain source image.
    PassThrough,
    /// Clear the canvas.
    Clear,
}

/// Computes the 3×3 homography mapping bird's-eye pixels to source-camera
/// pixels (before intrinsic re-application).
///
/// `viewing_distance` is how far above the plane, along its normal, the
/// synthetic top-down camera sits.
pub fn compute_homography(
    camera: &PinholeCamera,
    plane: &PlaneReference,
    viewing_distance: f64,
) -> Result<Matrix3<f64>, HomographyError> {
    if !camera.has_projection() {
        return Err(HomographyError::MissingIntrinsics);
    }
    let rotation_inverse = camera.extrinsics().rotation.inverse();

    // Everything below happens in camera coordinates.
    let facing = Unit::new_normalize(rotation_inverse * -plane.normal.into_inner());
    let forward = Vector3::z_axis();
    let rotation_to_normal = rotation_carrying(&facing, &forward)
        .to_rotation_matrix()
        .into_inner();

    let normal_cam = rotation_inverse * plane.normal.into_inner();
    let center_cam =
        rotation_inverse * (plane.center - Point3::from(camera.extrinsics().translation));

    let distance = center_cam.dot(&normal_cam).abs();
    if distance < DEGENERATE_EPS {
        return Err(HomographyError::DegeneratePlane);
    }

    // Synthetic camera position: viewing_distance along the normal from the
    // plane center, negated into the translation term.
    let anchor = -(normal_cam * viewing_distance + center_cam);
    let translation_factor = anchor * normal_cam.transpose() / distance;

    Ok(rotation_to_normal - translation_factor)
}

/// Resamples `source` into a `dst_width` × `dst_height` bird's-eye raster.
///
/// For every destination pixel `(x, y)` the homogeneous source coordinate is
/// `K · H⁻¹ · K⁻¹ · (x, y, 1)`, normalized by its z component and rescaled
/// from destination-canvas to source-image pixel space. In-bounds samples are
/// copied; everything else stays transparent.
pub fn resample(
    source: &RgbaImage,
    dst_width: u32,
    dst_height: u32,
    intrinsic: &Matrix3<f64>,
    intrinsic_inverse: &Matrix3<f64>,
    homography: &Matrix3<f64>,
) -> Result<RgbaImage, HomographyError> {
    let homography_inverse = homography
        .try_inverse()
        .ok_or(HomographyError::SingularHomography)?;
    let mapping = intrinsic * homography_inverse * intrinsic_inverse;

    let (src_width, src_height) = source.dimensions();
    let mut output = RgbaImage::new(dst_width, dst_height);
    for dst_y in 0..dst_height {
        for dst_x in 0..dst_width {
            let src = mapping * Vector3::new(dst_x as f64, dst_y as f64, 1.0);
            if !src.z.is_finite() || src.z.abs() < DEGENERATE_EPS {
                continue;
            }
            let src_x = src.x / src.z / dst_width as f64 * src_width as f64;
            let src_y = src.y / src.z / dst_height as f64 * src_height as f64;
            if src_x >= 0.0
                && src_y >= 0.0
                && src_x < src_width as f64
                && src_y < src_height as f64
            {
                output.put_pixel(dst_x, dst_y, *source.get_pixel(src_x as u32, src_y as u32));
            }
        }
    }
    Ok(output)
}

/// The bird's-eye engine: owns the current reference plane and homography,
/// recomputing from scratch on every input change; the matrix is never
/// patched from stale inputs.
#[derive(Debug)]
pub struct BirdsEyeView {
    plane: Option<PlaneReference>,
    viewing_distance: f64,
    state: BirdsEyeState,
    homography: Option<Matrix3<f64>>,
    epoch: u64,
}

impl BirdsEyeView {
    pub fn new(viewing_distance: f64) -> Self {
        BirdsEyeView {
            plane: None,
            viewing_distance,
            state: BirdsEyeState::NoPlane,
            homography: None,
            epoch: 0,
        }
    }

    /// View configured from the store's viewer settings.
    pub fn from_config(config: &ViewerConfig) -> Self {
        BirdsEyeView::new(config.distance)
    }

    pub fn state(&self) -> BirdsEyeState {
        self.state
    }

    /// Bumped on every recompute; callers holding results from an earlier
    /// epoch must discard them instead of blending with new inputs.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The current homography, available only in the `Ready` state with
    /// non-degenerate inputs.
    pub fn homography(&self) -> Option<&Matrix3<f64>> {
        self.homography.as_ref()
    }

    pub fn set_plane(&mut self, plane: Option<PlaneReference>) {
        self.plane = plane;
    }

    pub fn set_viewing_distance(&mut self, distance: f64) {
        self.viewing_distance = distance;
    }

    /// Full recompute from the latest inputs. Call whenever the selected
    /// plane, the sensor, or the camera calibration changes.
    pub fn update(&mut self, camera: &PinholeCamera) -> BirdsEyeState {
        self.epoch += 1;
        self.homography = None;
        self.state = match &self.plane {
            None => BirdsEyeState::NoPlane,
            Some(_) if !camera.has_projection() => BirdsEyeState::PlaneNoIntrinsics,
            Some(plane) => {
                match compute_homography(camera, plane, self.viewing_distance) {
                    Ok(h) => {
                        debug!("homography recomputed (epoch {})", self.epoch);
                        self.homography = Some(h);
                    }
                    Err(e) => warn!("homography degenerate, blanking frame: {e}"),
                }
                BirdsEyeState::Ready
            }
        };
        self.state
    }

    /// Produces this frame's output for the presentation layer.
    pub fn render(
        &self,
        camera: &PinholeCamera,
        source: Option<&RgbaImage>,
        dst_width: u32,
        dst_height: u32,
    ) -> ViewOutput {
        match self.state {
            BirdsEyeState::NoPlane | BirdsEyeState::PlaneNoIntrinsics => match source {
                Some(_) => ViewOutput::PassThrough,
                None => ViewOutput::Clear,
            },
            BirdsEyeState::Ready => {
                let (Some(source), Some(h), Some(k), Some(k_inv)) = (
                    source,
                    self.homography.as_ref(),
                    camera.intrinsic_matrix(),
                    camera.intrinsic_inverse(),
                ) else {
                    return ViewOutput::Clear;
                };
                match resample(source, dst_width, dst_height, k, k_inv, h) {
                    Ok(raster) => ViewOutput::Raster(raster),
                    Err(e) => {
                        warn!("resampling failed, blanking frame: {e}");
                        ViewOutput::Clear
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Resolution;
    use approx::assert_relative_eq;
    use image::Rgba;
    use nalgebra::UnitQuaternion;

    fn simple_camera() -> PinholeCamera {
        let mut camera = PinholeCamera::new(Resolution {
            width: 100,
            height: 100,
        });
        camera.set_intrinsics((100.0, 100.0), (50.0, 50.0)).unwrap();
        camera
    }

    fn facing_plane(distance: f64) -> PlaneReference {
        // Normal pointing back at the camera.
        PlaneReference {
            normal: Unit::new_normalize(-Vector3::z()),
            center: Point3::new(0.0, 0.0, distance),
        }
    }

    fn gradient_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128, 255])
        })
    }

    #[test]
    fn test_facing_plane_at_viewing_distance_is_identity() {
        // Camera at the origin looking down +z, plane facing it 5 units out,
        // synthetic camera also 5 units above the plane: no warp at all.
        let camera = simple_camera();
        let h = compute_homography(&camera, &facing_plane(5.0), 5.0).unwrap();
        assert_relative_eq!(h, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_camera_on_plane_is_degenerate() {
        let camera = simple_camera();
        let plane = facing_plane(0.0);
        assert!(matches!(
            compute_homography(&camera, &plane, 5.0),
            Err(HomographyError::DegeneratePlane)
        ));
    }

    #[test]
    fn test_missing_intrinsics_is_rejected() {
        let camera = PinholeCamera::new(Resolution {
            width: 100,
            height: 100,
        });
        assert!(matches!(
            compute_homography(&camera, &facing_plane(5.0), 5.0),
            Err(HomographyError::MissingIntrinsics)
        ));
    }

    #[test]
    fn test_identity_resample_copies_image() {
        let source = gradient_image(64, 64);
        let identity = Matrix3::identity();
        let output = resample(&source, 64, 64, &identity, &identity, &identity).unwrap();
        assert_eq!(output, source);
    }

    #[test]
    fn test_identity_resample_scales_between_canvas_sizes() {
        let source = gradient_image(64, 64);
        let identity = Matrix3::identity();
        let output = resample(&source, 32, 32, &identity, &identity, &identity).unwrap();
        for y in 0..32 {
            for x in 0..32 {
                assert_eq!(output.get_pixel(x, y), source.get_pixel(x * 2, y * 2));
            }
        }
    }

    #[test]
    fn test_end_to_end_identity_scenario() {
        // Camera at the origin looking down +z, intrinsics fx=fy=100,
        // cx=cy=50, plane facing the camera 5 units along forward, viewing
        // distance 5: the bird's-eye view equals direct image display.
        let camera = simple_camera();
        let source = gradient_image(100, 100);

        let mut view = BirdsEyeView::new(5.0);
        view.set_plane(Some(facing_plane(5.0)));
        assert_eq!(view.update(&camera), BirdsEyeState::Ready);
        assert_relative_eq!(*view.homography().unwrap(), Matrix3::identity(), epsilon = 1e-9);

        // Every destination pixel maps back onto itself.
        let k = camera.intrinsic_matrix().unwrap();
        let k_inv = camera.intrinsic_inverse().unwrap();
        let mapping = k * view.homography().unwrap().try_inverse().unwrap() * k_inv;
        for &(x, y) in &[(0.0, 0.0), (50.0, 50.0), (99.0, 13.0), (7.0, 88.0)] {
            let s = mapping * Vector3::new(x, y, 1.0);
            assert_relative_eq!(s.x / s.z, x, epsilon = 1e-9);
            assert_relative_eq!(s.y / s.z, y, epsilon = 1e-9);
        }

        match view.render(&camera, Some(&source), 100, 100) {
            ViewOutput::Raster(raster) => assert_eq!(raster.dimensions(), (100, 100)),
            other => panic!("expected raster output, got {other:?}"),
        }
    }

    #[test]
    fn test_identity_scenario_exact_copy_with_binary_intrinsics() {
        // Power-of-two intrinsics make K·K⁻¹ exact, so the resampled raster
        // is a bit-identical copy of the source.
        let mut camera = PinholeCamera::new(Resolution {
            width: 64,
            height: 64,
        });
        camera.set_intrinsics((128.0, 128.0), (64.0, 64.0)).unwrap();
        let source = gradient_image(64, 64);

        let mut view = BirdsEyeView::new(5.0);
        view.set_plane(Some(facing_plane(5.0)));
        view.update(&camera);

        match view.render(&camera, Some(&source), 64, 64) {
            ViewOutput::Raster(raster) => assert_eq!(raster, source),
            other => panic!("expected raster output, got {other:?}"),
        }
    }

    #[test]
    fn test_tilted_plane_resample_stays_in_bounds() {
        // Plane rotated 90° about the camera's horizontal axis: a hard
        // perspective warp that must neither crash nor index out of bounds.
        let camera = simple_camera();
        let plane = PlaneReference {
            normal: Unit::new_normalize(Vector3::new(0.0, -1.0, 0.0)),
            center: Point3::new(0.0, 2.0, 5.0),
        };
        let h = compute_homography(&camera, &plane, 5.0).unwrap();
        assert!(h.iter().all(|v| v.is_finite()));

        let source = gradient_image(100, 100);
        let k = camera.intrinsic_matrix().unwrap();
        let k_inv = camera.intrinsic_inverse().unwrap();
        let output = resample(&source, 100, 100, k, k_inv, &h).unwrap();
        assert_eq!(output.dimensions(), (100, 100));
    }

    #[test]
    fn test_state_machine_transitions() {
        let camera = simple_camera();
        let blind_camera = PinholeCamera::new(Resolution {
            width: 100,
            height: 100,
        });
        let source = gradient_image(10, 10);
        let mut view = BirdsEyeView::new(5.0);

        assert_eq!(view.update(&camera), BirdsEyeState::NoPlane);
        assert_eq!(
            view.render(&camera, Some(&source), 10, 10),
            ViewOutput::PassThrough
        );
        assert_eq!(view.render(&camera, None, 10, 10), ViewOutput::Clear);

        view.set_plane(Some(facing_plane(5.0)));
        assert_eq!(view.update(&blind_camera), BirdsEyeState::PlaneNoIntrinsics);
        assert_eq!(
            view.render(&blind_camera, Some(&source), 10, 10),
            ViewOutput::PassThrough
        );

        assert_eq!(view.update(&camera), BirdsEyeState::Ready);
        assert!(view.homography().is_some());
    }

    #[test]
    fn test_degenerate_plane_blanks_frame() {
        let camera = simple_camera();
        let source = gradient_image(10, 10);
        let mut view = BirdsEyeView::new(5.0);
        view.set_plane(Some(facing_plane(0.0)));

        assert_eq!(view.update(&camera), BirdsEyeState::Ready);
        assert!(view.homography().is_none());
        assert_eq!(view.render(&camera, Some(&source), 10, 10), ViewOutput::Clear);
    }

    #[test]
    fn test_view_from_store_config() {
        let view = BirdsEyeView::from_config(&ViewerConfig::default());
        assert_relative_eq!(view.viewing_distance, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_epoch_advances_every_update() {
        let camera = simple_camera();
        let mut view = BirdsEyeView::new(5.0);
        let first = view.epoch();
        view.update(&camera);
        view.update(&camera);
        assert_eq!(view.epoch(), first + 2);
    }
}
