//! Horizontal-plane geometry helpers
//!
//! Positions are y-up: the horizontal plane is `xz` and `y` is height.
//! "2.5D" checks combine a horizontal distance with a vertical tolerance.

use glam::Vec3;

/// Squared distance between two points in the xz-plane
#[inline]
pub fn dist_sqr_2d(a: &Vec3, b: &Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Distance between two points in the xz-plane
#[inline]
pub fn dist_2d(a: &Vec3, b: &Vec3) -> f32 {
    dist_sqr_2d(a, b).sqrt()
}

/// Absolute height difference between two points
#[inline]
pub fn height_delta(a: &Vec3, b: &Vec3) -> f32 {
    (b.y - a.y).abs()
}

/// Checks whether `b` lies within a vertical cylinder of the given radius and
/// half-height centred on `a`
#[inline]
pub fn within_cylinder(a: &Vec3, b: &Vec3, radius: f32, height: f32) -> bool {
    dist_sqr_2d(a, b) <= radius * radius && height_delta(a, b) <= height
}

/// Squared distance from a point to a segment, measured in the xz-plane
pub fn dist_point_segment_sqr_2d(p: &Vec3, a: &Vec3, b: &Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let dx = p.x - a.x;
    let dz = p.z - a.z;
    let d = abx * abx + abz * abz;
    let mut t = abx * dx + abz * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    let ex = a.x + t * abx - p.x;
    let ez = a.z + t * abz - p.z;
    ex * ex + ez * ez
}

/// Projects a vector onto the xz-plane
#[inline]
pub fn flatten(v: &Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Normalized horizontal direction of `v`, or `None` when it has no horizontal extent
pub fn direction_2d(v: &Vec3) -> Option<Vec3> {
    let flat = flatten(v);
    let len = flat.length();
    if len < 1e-6 {
        None
    } else {
        Some(flat / len)
    }
}

/// Unsigned angle in radians between two horizontal directions
pub fn angle_2d(a: &Vec3, b: &Vec3) -> f32 {
    match (direction_2d(a), direction_2d(b)) {
        (Some(a), Some(b)) => a.dot(b).clamp(-1.0, 1.0).acos(),
        _ => 0.0,
    }
}

/// Rotates horizontal direction `from` towards `to` by at most `max_angle` radians
pub fn rotate_towards_2d(from: &Vec3, to: &Vec3, max_angle: f32) -> Vec3 {
    let (from, to) = match (direction_2d(from), direction_2d(to)) {
        (Some(f), Some(t)) => (f, t),
        (None, Some(t)) => return t,
        (Some(f), None) => return f,
        (None, None) => return Vec3::ZERO,
    };

    let angle = from.dot(to).clamp(-1.0, 1.0).acos();
    if angle <= max_angle {
        return to;
    }

    // Sign of the rotation around +y
    let cross_y = from.z * to.x - from.x * to.z;
    let step = if cross_y >= 0.0 { max_angle } else { -max_angle };
    let (sin, cos) = step.sin_cos();
    Vec3::new(
        from.x * cos + from.z * sin,
        0.0,
        -from.x * sin + from.z * cos,
    )
}
