//! Leaf geometric utilities over facial landmark points.
//!
//! All coordinates are in normalized image space. Functions here are pure
//! and allocation-free except where a ring copy is unavoidable.

use crate::landmarks::Point3;

/// Euclidean distance between two 3D points.
pub fn distance(a: &Point3, b: &Point3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Euclidean distance ignoring depth.
pub fn distance_2d(a: &Point3, b: &Point3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Polygon area of an ordered ring via the shoelace formula (x/y plane).
///
/// Returns 0.0 for rings with fewer than 3 points.
pub fn polygon_area(ring: &[Point3]) -> f32 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = &ring[i];
        let b = &ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum / 2.0).abs()
}

/// Centroid of a point subset.
pub fn centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::default();
    }
    let n = points.len() as f32;
    let mut c = Point3::default();
    for p in points {
        c.x += p.x;
        c.y += p.y;
        c.z += p.z;
    }
    c.x /= n;
    c.y /= n;
    c.z /= n;
    c
}

/// Signed curvature of the mouth: height of the corner midpoint relative to
/// the top-center landmark, normalized by mouth width.
///
/// Positive values mean the corners sit below the top center (a smile-like
/// arc in image coordinates where y grows downward); negative means above.
pub fn mouth_curvature(left_corner: &Point3, right_corner: &Point3, top_center: &Point3) -> f32 {
    let width = distance_2d(left_corner, right_corner);
    if width < 1e-6 {
        return 0.0;
    }
    let corner_mid_y = (left_corner.y + right_corner.y) / 2.0;
    (corner_mid_y - top_center.y) / width
}

/// Roundness of a ring in [0, 1]: 1 − normalized variance of distances from
/// the centroid. A perfect circle scores 1.0.
pub fn roundness(ring: &[Point3]) -> f32 {
    if ring.len() < 3 {
        return 0.0;
    }

    let c = centroid(ring);
    let dists: Vec<f32> = ring.iter().map(|p| distance_2d(p, &c)).collect();
    let mean: f32 = dists.iter().sum::<f32>() / dists.len() as f32;
    if mean < 1e-6 {
        return 0.0;
    }

    let variance: f32 =
        dists.iter().map(|d| (d - mean) * (d - mean)).sum::<f32>() / dists.len() as f32;

    (1.0 - (variance.sqrt() / mean)).clamp(0.0, 1.0)
}

/// Mean cross-distance between paired upper and lower lip points.
///
/// Pairs are truncated to the shorter of the two slices.
pub fn mean_lip_separation(upper: &[Point3], lower: &[Point3]) -> f32 {
    let n = upper.len().min(lower.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f32 = upper
        .iter()
        .zip(lower.iter())
        .take(n)
        .map(|(u, l)| distance(u, l))
        .sum();
    sum / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point3 {
        Point3 { x, y, z: 0.0 }
    }

    #[test]
    fn distance_matches_pythagoras() {
        let d = distance(&p(0.0, 0.0), &p(3.0, 4.0));
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn unit_square_area() {
        let ring = vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        assert!((polygon_area(&ring) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_ring_has_zero_area() {
        assert_eq!(polygon_area(&[p(0.0, 0.0), p(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn centroid_of_square() {
        let ring = vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        let c = centroid(&ring);
        assert!((c.x - 0.5).abs() < 1e-6);
        assert!((c.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn regular_polygon_is_round() {
        let ring: Vec<Point3> = (0..16)
            .map(|i| {
                let t = (i as f32) * std::f32::consts::TAU / 16.0;
                p(t.cos(), t.sin())
            })
            .collect();
        assert!(roundness(&ring) > 0.99);
    }

    #[test]
    fn flat_line_is_not_round() {
        let ring: Vec<Point3> = (0..8).map(|i| p(i as f32 * 0.1, 0.0)).collect();
        assert!(roundness(&ring) < 0.7);
    }

    #[test]
    fn curvature_sign_follows_corner_height() {
        let smile = mouth_curvature(&p(0.0, 0.6), &p(0.4, 0.6), &p(0.2, 0.5));
        let frown = mouth_curvature(&p(0.0, 0.5), &p(0.4, 0.5), &p(0.2, 0.6));
        assert!(smile > 0.0);
        assert!(frown < 0.0);
    }

    #[test]
    fn lip_separation_averages_pairs() {
        let upper = vec![p(0.0, 0.0), p(0.1, 0.0)];
        let lower = vec![p(0.0, 0.02), p(0.1, 0.04)];
        let sep = mean_lip_separation(&upper, &lower);
        assert!((sep - 0.03).abs() < 1e-6);
    }
}
