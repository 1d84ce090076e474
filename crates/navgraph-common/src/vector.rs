//! 3D vector utilities

use glam::Vec3;

/// Calculates the distance between two points
#[inline]
pub fn distance(a: &Vec3, b: &Vec3) -> f32 {
    (*b - *a).length()
}

/// Calculates the squared distance between two points
#[inline]
pub fn distance_squared(a: &Vec3, b: &Vec3) -> f32 {
    (*b - *a).length_squared()
}

/// Returns the point lying `dist` units from `a` towards `b`, clamped to `b`
pub fn point_along_segment(a: &Vec3, b: &Vec3, dist: f32) -> Vec3 {
    let ab = *b - *a;
    let len = ab.length();
    if len < f32::EPSILON || dist >= len {
        return *b;
    }
    if dist <= 0.0 {
        return *a;
    }
    *a + ab * (dist / len)
}

/// Length of a polyline
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}
