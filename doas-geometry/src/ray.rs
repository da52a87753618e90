//!
//! Local-ENU ray geometry shared by the two-instrument and single-instrument
//! solvers (spec §4.9), grounded on
//! `original_source/PPPLib/src/Geometry/GeometryCalculator.cpp`'s `GetDirection`,
//! `Rotate`, and `Intersection` helpers.
//!

/// A ray in a local east-north-up frame, `origin + t * direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: [f64; 3],
    pub direction: [f64; 3],
}

/// Direction of a scanner's plume-centre ray in its own local frame: moving one
/// unit up the ray (`t = 1`) corresponds to one unit of altitude gain, with
/// horizontal displacement `(x, y)` determined by scan angle, cone angle, and
/// tilt (`CGeometryCalculator::GetDirection`).
pub fn plume_centre_direction(scan_angle_deg: f64, cone_angle_deg: f64, tilt_deg: f64) -> [f64; 3] {
    let tan_cone = cone_angle_deg.to_radians().tan();
    let cos_tilt = tilt_deg.to_radians().cos();
    let sin_tilt = tilt_deg.to_radians().sin();
    let cos_alpha = scan_angle_deg.to_radians().cos();
    let sin_alpha = scan_angle_deg.to_radians().sin();
    let divisor = cos_alpha * cos_tilt + sin_tilt / tan_cone;

    [
        (cos_tilt / tan_cone - cos_alpha * sin_tilt) / divisor,
        sin_alpha / divisor,
        1.0,
    ]
}

/// Rotates `v` by `angle_deg` (degrees, clockwise as compass bearings are) about
/// the vertical axis.
pub fn rotate_about_vertical(v: [f64; 3], angle_deg: f64) -> [f64; 3] {
    let cos = angle_deg.to_radians().cos();
    let sin = angle_deg.to_radians().sin();
    [cos * v[0] + sin * v[1], -sin * v[0] + cos * v[1], v[2]]
}

fn cross(u: [f64; 3], v: [f64; 3]) -> [f64; 3] {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn dot(u: [f64; 3], v: [f64; 3]) -> f64 {
    u[0] * v[0] + u[1] * v[1] + u[2] * v[2]
}

fn norm2(v: [f64; 3]) -> f64 {
    dot(v, v)
}

fn point_on_ray(ray: &Ray, t: f64) -> [f64; 3] {
    [
        ray.origin[0] + t * ray.direction[0],
        ray.origin[1] + t * ray.direction[1],
        ray.origin[2] + t * ray.direction[2],
    ]
}

/// Closest-approach parameters `(t1, t2)` for two skew rays, plus the squared
/// distance between the two closest points (`CGeometryCalculator::Intersection`).
/// Returns `None` if the rays are parallel.
pub fn closest_approach(a: &Ray, b: &Ray) -> Option<(f64, f64, f64)> {
    let cross_dirs = cross(a.direction, b.direction);
    let n2 = norm2(cross_dirs);
    if n2.abs() < 1e-19 {
        return None;
    }

    let delta = [
        b.origin[0] - a.origin[0],
        b.origin[1] - a.origin[1],
        b.origin[2] - a.origin[2],
    ];

    let det = |c1: [f64; 3], c2: [f64; 3], c3: [f64; 3]| -> f64 {
        c1[0] * c2[1] * c3[2] + c2[0] * c3[1] * c1[2] + c3[0] * c1[1] * c2[2]
            - c1[0] * c3[1] * c2[2]
            - c2[0] * c1[1] * c3[2]
            - c3[0] * c2[1] * c1[2]
    };

    let t1 = det(delta, b.direction, cross_dirs) / n2;
    let t2 = det(delta, a.direction, cross_dirs) / n2;

    let p1 = point_on_ray(a, t1);
    let p2 = point_on_ray(b, t2);
    let miss2 = (p1[0] - p2[0]).powi(2) + (p1[1] - p2[1]).powi(2) + (p1[2] - p2[2]).powi(2);

    Some((t1, t2, miss2))
}

pub fn evaluate(ray: &Ray, t: f64) -> [f64; 3] {
    point_on_ray(ray, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_points_straight_up_for_zero_scan_angle_flat_scanner() {
        let d = plume_centre_direction(0.0, 90.0, 0.0);
        assert!(d[0].abs() < 1e-9);
        assert!(d[1].abs() < 1e-9);
        assert!((d[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn closest_approach_of_intersecting_rays_has_zero_miss_distance() {
        let a = Ray {
            origin: [0.0, 0.0, 0.0],
            direction: [0.0, 0.0, 1.0],
        };
        let b = Ray {
            origin: [10.0, 0.0, 0.0],
            direction: [-1.0, 0.0, 1.0],
        };
        let (t1, _, miss2) = closest_approach(&a, &b).unwrap();
        assert!(miss2 < 1e-6);
        assert!((t1 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn parallel_rays_report_none() {
        let a = Ray {
            origin: [0.0, 0.0, 0.0],
            direction: [0.0, 0.0, 1.0],
        };
        let b = Ray {
            origin: [10.0, 0.0, 0.0],
            direction: [0.0, 0.0, 1.0],
        };
        assert!(closest_approach(&a, &b).is_none());
    }
}
