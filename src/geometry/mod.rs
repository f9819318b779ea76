//! Small projective-geometry helpers shared by the camera, homography, and
//! controller modules: world-space rays, infinite planes, and minimal
//! rotations between unit vectors.

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

const EPS: f64 = 1e-12;

/// A half-line in world space, used for pointer picking and drag tracking.
#[derive(Debug, Clone)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Unit<Vector3<f64>>) -> Self {
        Ray { origin, direction }
    }

    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.into_inner() * t
    }

    /// Intersects the ray with a plane. Returns `None` when the ray is
    /// parallel to the plane or the hit is behind the origin.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<Point3<f64>> {
        let denom = plane.normal.dot(&self.direction.into_inner());
        if denom.abs() < EPS {
            return None;
        }
        let t = -plane.signed_distance(&self.origin) / denom;
        if t < 0.0 {
            return None;
        }
        Some(self.point_at(t))
    }
}

/// An infinite plane `normal · p + constant = 0`.
#[derive(Debug, Clone)]
pub struct Plane {
    pub normal: Unit<Vector3<f64>>,
    pub constant: f64,
}

impl Plane {
    /// Plane with the given normal passing through `point`.
    pub fn from_normal_and_point(normal: Unit<Vector3<f64>>, point: &Point3<f64>) -> Self {
        Plane {
            normal,
            constant: -normal.dot(&point.coords),
        }
    }

    /// Signed distance from `point` to the plane, positive on the normal side.
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.constant
    }
}

/// The minimal rotation carrying unit vector `from` onto unit vector `to`.
///
/// Antiparallel inputs have no unique minimal rotation; this picks a 180°
/// turn about an arbitrary axis orthogonal to `from`, matching the behavior
/// expected from a `setFromUnitVectors`-style constructor.
pub fn rotation_carrying(
    from: &Unit<Vector3<f64>>,
    to: &Unit<Vector3<f64>>,
) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between(&from.into_inner(), &to.into_inner()).unwrap_or_else(|| {
        let reference = if from.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = Unit::new_normalize(from.cross(&reference));
        UnitQuaternion::from_axis_angle(&axis, std::f64::consts::PI)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ray_plane_intersection() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::z_axis());
        let plane = Plane::from_normal_and_point(Vector3::z_axis(), &Point3::new(0.0, 0.0, 5.0));
        let hit = ray.intersect_plane(&plane).unwrap();
        assert_relative_eq!(hit, Point3::new(0.0, 0.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn test_ray_parallel_to_plane_misses() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::x_axis());
        let plane = Plane::from_normal_and_point(Vector3::z_axis(), &Point3::new(0.0, 0.0, 5.0));
        assert!(ray.intersect_plane(&plane).is_none());
    }

    #[test]
    fn test_ray_rejects_hit_behind_origin() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), Vector3::z_axis());
        let plane = Plane::from_normal_and_point(Vector3::z_axis(), &Point3::new(0.0, 0.0, 5.0));
        assert!(ray.intersect_plane(&plane).is_none());
    }

    #[test]
    fn test_signed_distance_sides() {
        let plane = Plane::from_normal_and_point(Vector3::z_axis(), &Point3::new(0.0, 0.0, 2.0));
        assert!(plane.signed_distance(&Point3::new(0.0, 0.0, 3.0)) > 0.0);
        assert!(plane.signed_distance(&Point3::new(0.0, 0.0, 1.0)) < 0.0);
        assert_relative_eq!(
            plane.signed_distance(&Point3::new(7.0, -4.0, 2.0)),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotation_carrying_general_case() {
        let from = Unit::new_normalize(Vector3::new(1.0, 2.0, -0.5));
        let to = Unit::new_normalize(Vector3::new(-0.3, 0.4, 1.0));
        let q = rotation_carrying(&from, &to);
        assert_relative_eq!(q * from.into_inner(), to.into_inner(), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_carrying_antiparallel() {
        let from = Vector3::z_axis();
        let to = Unit::new_normalize(-Vector3::z());
        let q = rotation_carrying(&from, &to);
        assert_relative_eq!(q * from.into_inner(), to.into_inner(), epsilon = 1e-12);
        // Rotation matrices of unit quaternions stay orthogonal.
        let r = q.to_rotation_matrix();
        let product = r.matrix().transpose() * r.matrix();
        assert_relative_eq!(product, nalgebra::Matrix3::identity(), epsilon = 1e-12);
    }
}
