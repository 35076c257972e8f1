//! Perspective transformation from four point correspondences
//!
//! The homography is found with the Direct Linear Transform: each
//! correspondence contributes two rows to an 8x8 system (with h33 fixed to 1)
//! which is solved by LU decomposition on conditioned coordinates. Configurations that do not pin down a
//! unique projective map are rejected as degenerate.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use thiserror::Error;

use crate::config::Point;
use crate::correspondence::CorrespondenceSet;

/// Below this |w| a mapped point is treated as lying at infinity
const W_EPSILON: f64 = 1e-10;

/// Relative tolerance for three points to count as collinear
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Max reprojection error, relative to the destination extent
const REPROJECTION_EPSILON: f64 = 1e-6;

/// The four correspondences do not determine a homography
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("degenerate correspondence: points are collinear, coincident or ill-conditioned")]
pub struct DegenerateCorrespondence;

/// Perspective transformation matrix (3x3 homography)
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyTransform {
    /// Source to destination, normalised so h33 = 1
    matrix: Matrix3<f64>,
    /// Destination to source in row-major order (used for warping)
    inverse: [f64; 9],
}

impl HomographyTransform {
    /// Compute the homography mapping every source point onto its destination
    pub fn compute(correspondences: &CorrespondenceSet) -> Result<Self, DegenerateCorrespondence> {
        let src = correspondences.map(|c| c.source);
        let dst = correspondences.map(|c| c.destination);

        if !src.iter().chain(dst.iter()).all(Point::is_finite)
            || has_collinear_triple(&src)
            || has_collinear_triple(&dst)
        {
            return Err(DegenerateCorrespondence);
        }

        let matrix = solve_conditioned(&src, &dst).ok_or(DegenerateCorrespondence)?;
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(DegenerateCorrespondence);
        }

        let inverse = matrix.try_inverse().ok_or(DegenerateCorrespondence)?;
        let inverse = normalize(inverse).ok_or(DegenerateCorrespondence)?;

        let transform = Self {
            matrix,
            inverse: row_major(&inverse),
        };

        let extent = dst
            .iter()
            .map(|p| p.x.abs().max(p.y.abs()))
            .fold(1.0f64, f64::max);
        for (s, d) in src.iter().zip(dst.iter()) {
            match transform.transform_point(*s) {
                Some(p) if p.distance_squared(*d).sqrt() <= REPROJECTION_EPSILON * extent => {}
                _ => return Err(DegenerateCorrespondence),
            }
        }

        Ok(transform)
    }

    /// Transform a point from source to destination coordinates
    #[inline]
    pub fn transform_point(&self, p: Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < W_EPSILON {
            return None;
        }
        Some(Point::new(v.x / v.z, v.y / v.z))
    }

    /// Transform a point from destination to source coordinates
    #[inline]
    pub fn inverse_transform_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        apply_homography(&self.inverse, x, y)
    }
}

#[cfg(test)]
impl HomographyTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            inverse: row_major(&Matrix3::identity()),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Whether this is the identity within `tolerance` per entry
    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.matrix - Matrix3::identity()).amax() <= tolerance
    }
}

/// Apply a row-major homography to a point, `None` at infinity
#[inline]
fn apply_homography(h: &[f64; 9], x: f64, y: f64) -> Option<(f64, f64)> {
    let w = h[6] * x + h[7] * y + h[8];
    if w.abs() < W_EPSILON {
        return None;
    }
    let xp = (h[0] * x + h[1] * y + h[2]) / w;
    let yp = (h[3] * x + h[4] * y + h[5]) / w;
    Some((xp, yp))
}

/// Solve the DLT on conditioned points and undo the conditioning.
///
/// Both sets are moved to mean distance sqrt(2) from an origin before
/// solving, so a quad of a few pixels far out on the canvas gives a system as
/// well scaled as a full-size one. The source origin stays on the first
/// source point, which always maps to a finite destination, so fixing h33 = 1
/// in the conditioned system never excludes a valid map.
fn solve_conditioned(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    let centroid = Point::new(
        dst.iter().map(|p| p.x).sum::<f64>() / 4.0,
        dst.iter().map(|p| p.y).sum::<f64>() / 4.0,
    );
    let (t_src, src_n) = condition(src, src[0])?;
    let (t_dst, dst_n) = condition(dst, centroid)?;

    let h = solve_dlt(&src_n, &dst_n)?;
    #[rustfmt::skip]
    let t_dst_inv = Matrix3::new(
        1.0 / t_dst[(0, 0)], 0.0, -t_dst[(0, 2)] / t_dst[(0, 0)],
        0.0, 1.0 / t_dst[(1, 1)], -t_dst[(1, 2)] / t_dst[(1, 1)],
        0.0, 0.0, 1.0,
    );
    let m = t_dst_inv * h * t_src;

    let h33 = m[(2, 2)];
    if h33.abs() < W_EPSILON || !h33.is_finite() {
        return None;
    }
    Some(m / h33)
}

/// Similarity taking `points` to mean distance sqrt(2) around `origin`
fn condition(points: &[Point; 4], origin: Point) -> Option<(Matrix3<f64>, [Point; 4])> {
    let mean_dist = points
        .iter()
        .map(|p| p.distance_squared(origin).sqrt())
        .sum::<f64>()
        / 4.0;
    if !(mean_dist > 0.0 && mean_dist.is_finite()) {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * origin.x, 0.0, s, -s * origin.y, 0.0, 0.0, 1.0);
    let moved = points.map(|p| Point::new(s * (p.x - origin.x), s * (p.y - origin.y)));
    Some((t, moved))
}

/// Build and solve the 8x8 DLT system. `None` if it is singular.
fn solve_dlt(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    // For each correspondence (x,y) -> (x',y'):
    //   x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
    //   x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y) = (s.x, s.y);
        let (xp, yp) = (d.x, d.y);
        let r1 = i * 2;
        let r2 = r1 + 1;

        a[(r1, 0)] = x;
        a[(r1, 1)] = y;
        a[(r1, 2)] = 1.0;
        a[(r1, 6)] = -xp * x;
        a[(r1, 7)] = -xp * y;
        b[r1] = xp;

        a[(r2, 3)] = x;
        a[(r2, 4)] = y;
        a[(r2, 5)] = 1.0;
        a[(r2, 6)] = -yp * x;
        a[(r2, 7)] = -yp * y;
        b[r2] = yp;
    }

    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Scale so the largest entry has magnitude 1. The inverse can have h33 = 0
/// when the canvas origin lies on the vanishing line, so h33 is not used.
fn normalize(m: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let scale = m.amax();
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    Some(m / scale)
}

#[rustfmt::skip]
fn row_major(m: &Matrix3<f64>) -> [f64; 9] {
    [
        m[(0, 0)], m[(0, 1)], m[(0, 2)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)],
    ]
}

/// True if any three of the four points are collinear or coincident
fn has_collinear_triple(points: &[Point; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let (abx, aby) = (b.x - a.x, b.y - a.y);
        let (acx, acy) = (c.x - a.x, c.y - a.y);
        let cross = abx * acy - aby * acx;
        let scale = (abx * abx + aby * aby).max(acx * acx + acy * acy);
        cross.abs() <= COLLINEAR_EPSILON * scale
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::{source_corners, Correspondence};

    fn set(src: [Point; 4], dst: [Point; 4]) -> CorrespondenceSet {
        std::array::from_fn(|i| Correspondence {
            source: src[i],
            destination: dst[i],
        })
    }

    fn assert_close(p: Point, x: f64, y: f64) {
        assert!(
            (p.x - x).abs() < 1e-6 && (p.y - y).abs() < 1e-6,
            "expected ({}, {}), got ({}, {})",
            x,
            y,
            p.x,
            p.y
        );
    }

    #[test]
    fn test_identity_transform() {
        let src = source_corners(100, 100);
        let transform = HomographyTransform::compute(&set(src, src)).unwrap();

        assert!(transform.is_identity(1e-9));
        assert_close(transform.transform_point(Point::new(50.0, 50.0)).unwrap(), 50.0, 50.0);
    }

    #[test]
    fn test_maps_corners_onto_destination() {
        let src = source_corners(512, 512);
        let dst = [
            Point::new(277.0, 89.0),
            Point::new(551.0, 217.0),
            Point::new(319.0, 399.0),
            Point::new(39.0, 270.0),
        ];
        let transform = HomographyTransform::compute(&set(src, dst)).unwrap();

        for (s, d) in src.iter().zip(dst.iter()) {
            assert_close(transform.transform_point(*s).unwrap(), d.x, d.y);
            let (x, y) = transform.inverse_transform_point(d.x, d.y).unwrap();
            assert_close(Point::new(x, y), s.x, s.y);
        }
    }

    #[test]
    fn test_pure_scale() {
        let src = source_corners(100, 50);
        let dst = source_corners(200, 150);
        let transform = HomographyTransform::compute(&set(src, dst)).unwrap();

        assert_close(transform.transform_point(Point::new(10.0, 10.0)).unwrap(), 20.0, 30.0);
        assert!(transform.matrix()[(2, 0)].abs() < 1e-12);
        assert!(transform.matrix()[(2, 1)].abs() < 1e-12);
    }

    #[test]
    fn test_three_coincident_points_degenerate() {
        let src = source_corners(100, 100);
        let p = Point::new(40.0, 40.0);
        let dst = [p, p, p, Point::new(90.0, 10.0)];
        assert_eq!(
            HomographyTransform::compute(&set(src, dst)),
            Err(DegenerateCorrespondence)
        );
    }

    #[test]
    fn test_all_coincident_degenerate() {
        let src = source_corners(100, 100);
        let p = Point::new(5.0, 5.0);
        assert!(HomographyTransform::compute(&set(src, [p; 4])).is_err());
    }

    #[test]
    fn test_collinear_degenerate() {
        let src = source_corners(100, 100);
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
        ];
        assert!(HomographyTransform::compute(&set(src, dst)).is_err());

        // only three on a line is enough
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(50.0, 80.0),
        ];
        assert!(HomographyTransform::compute(&set(src, dst)).is_err());
    }

    #[test]
    fn test_non_finite_degenerate() {
        let src = source_corners(100, 100);
        let mut dst = src;
        dst[2] = Point::new(f64::INFINITY, 3.0);
        assert!(HomographyTransform::compute(&set(src, dst)).is_err());
    }

    #[test]
    fn test_recovers_after_degenerate() {
        let src = source_corners(100, 100);
        let mut dst = src;
        dst[1] = dst[0];
        assert!(HomographyTransform::compute(&set(src, dst)).is_err());
        dst[1] = Point::new(120.0, -5.0);
        assert!(HomographyTransform::compute(&set(src, dst)).is_ok());
    }

    fn assert_maps_corners(src: [Point; 4], dst: [Point; 4]) {
        let transform = HomographyTransform::compute(&set(src, dst))
            .unwrap_or_else(|_| panic!("{:?} -> {:?} rejected", src, dst));
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = transform.transform_point(*s).unwrap();
            assert!(
                p.distance_squared(*d).sqrt() < 1e-5,
                "expected {:?}, got {:?}",
                d,
                p
            );
            let (bx, by) = transform.inverse_transform_point(d.x, d.y).unwrap();
            assert!((bx - s.x).abs() < 1e-3 && (by - s.y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_small_quad_far_from_origin() {
        assert_maps_corners(
            source_corners(512, 512),
            [
                Point::new(1553.0, 723.0),
                Point::new(1568.0, 724.0),
                Point::new(1567.0, 738.0),
                Point::new(1552.0, 737.0),
            ],
        );
        assert_maps_corners(
            source_corners(512, 512),
            [
                Point::new(146.9, 970.1),
                Point::new(156.3, 971.4),
                Point::new(157.4, 984.8),
                Point::new(142.4, 986.7),
            ],
        );
    }

    #[test]
    fn test_large_source_into_one_pixel() {
        assert_maps_corners(
            source_corners(4000, 3000),
            [
                Point::new(100.0, 100.0),
                Point::new(101.0, 100.0),
                Point::new(101.0, 101.0),
                Point::new(100.0, 101.0),
            ],
        );
    }

    #[test]
    fn test_convex_quads_accepted_at_every_scale_and_offset() {
        // a mildly perspective convex shape on the unit square
        let shape = [(0.0, 0.0), (1.0, 0.05), (0.95, 0.9), (0.08, 1.0)];
        let offsets = [
            (0.0, 0.0),
            (37.5, 12.25),
            (700.0, 400.0),
            (1100.0, 250.0),
            (1560.0, 730.0),
            (1900.0, 1060.0),
        ];
        for (width, height) in [(512, 512), (4000, 3000), (17, 9)] {
            for size in [1.0, 5.0, 15.0, 100.0, 800.0] {
                for (ox, oy) in offsets {
                    let dst = shape.map(|(u, v)| Point::new(ox + u * size, oy + v * size));
                    assert_maps_corners(source_corners(width, height), dst);
                }
            }
        }
    }

    #[test]
    fn test_concave_quad_accepted() {
        // no three collinear, the vanishing line crosses the source
        assert_maps_corners(
            source_corners(100, 100),
            [
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(30.0, 30.0),
                Point::new(0.0, 100.0),
            ],
        );
    }

    #[test]
    fn test_apply_homography_at_infinity() {
        let h = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        assert_eq!(apply_homography(&h, 0.0, 5.0), None);
        assert_eq!(apply_homography(&h, 2.0, 4.0), Some((1.0, 2.0)));
    }
}
