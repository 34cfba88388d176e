//! Geometric measurements on binary region masks.
//!
//! All lengths are in millimetres. Mask arrays are indexed `(slice, row, column)`,
//! spacing is `(x, y, z)` = (column, row, slice).

use itertools::Itertools;
use std::f64::consts::PI;

use crate::volume::RegionMask;

const NEIGHBOURS: [(isize, isize, isize); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// Area of the voxel faces separating the region from the background.
pub fn surface_area(mask: &RegionMask) -> f64 {
    let [sx, sy, sz] = mask.spacing;
    // Area of a face perpendicular to the z, y and x axis respectively
    let face_area = [sx * sy, sx * sz, sy * sz];

    mask.indices()
        .map(|(z, y, x)| {
            let (z, y, x) = (z as isize, y as isize, x as isize);
            NEIGHBOURS
                .iter()
                .enumerate()
                .filter(|(_, (dz, dy, dx))| !mask.contains(z + dz, y + dy, x + dx))
                .map(|(i, _)| face_area[i / 2])
                .sum::<f64>()
        })
        .sum()
}

/// Inclusive bounding box as `(min, max)` indices in `(slice, row, column)` order.
pub fn bounding_box(mask: &RegionMask) -> ([usize; 3], [usize; 3]) {
    mask.indices().fold(
        ([usize::MAX; 3], [0; 3]),
        |(mut lo, mut hi), (z, y, x)| {
            for (axis, v) in [z, y, x].into_iter().enumerate() {
                lo[axis] = lo[axis].min(v);
                hi[axis] = hi[axis].max(v);
            }
            (lo, hi)
        },
    )
}

/// Second order moments of the voxel centres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    /// Centroid as a fractional voxel index `(i, j, k)` = (column, row, slice).
    pub centroid: [f64; 3],
    /// Eigenvalues of the covariance matrix in mm², largest first.
    pub eigenvalues: [f64; 3],
}

impl Moments {
    pub fn from_mask(mask: &RegionMask) -> Self {
        let n = mask.voxels() as f64;
        let [sx, sy, sz] = mask.spacing;

        let mut sum = [0.0; 3];
        for (z, y, x) in mask.indices() {
            sum[0] += x as f64;
            sum[1] += y as f64;
            sum[2] += z as f64;
        }
        let centroid = sum.map(|s| s / n);

        let mut cov = [[0.0; 3]; 3];
        for (z, y, x) in mask.indices() {
            let d = [
                (x as f64 - centroid[0]) * sx,
                (y as f64 - centroid[1]) * sy,
                (z as f64 - centroid[2]) * sz,
            ];
            for a in 0..3 {
                for b in a..3 {
                    cov[a][b] += d[a] * d[b];
                }
            }
        }
        for a in 0..3 {
            for b in a..3 {
                cov[a][b] /= n;
                cov[b][a] = cov[a][b];
            }
        }

        Self {
            centroid,
            eigenvalues: symmetric_eigenvalues(cov).map(|v| v.max(0.0)),
        }
    }

    /// Axis lengths `4 * sqrt(eigenvalue)`, largest first.
    pub fn axis_lengths(&self) -> [f64; 3] {
        self.eigenvalues.map(|v| 4.0 * v.sqrt())
    }
}

/// Eigenvalues of a symmetric 3x3 matrix, sorted in descending order.
pub fn symmetric_eigenvalues(m: [[f64; 3]; 3]) -> [f64; 3] {
    let p1 = m[0][1].powi(2) + m[0][2].powi(2) + m[1][2].powi(2);
    if p1 == 0.0 {
        let mut diag = [m[0][0], m[1][1], m[2][2]];
        diag.sort_by(|a, b| b.total_cmp(a));
        return diag;
    }

    let q = (m[0][0] + m[1][1] + m[2][2]) / 3.0;
    let p2 = (m[0][0] - q).powi(2) + (m[1][1] - q).powi(2) + (m[2][2] - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();

    let mut b = m;
    for (i, row) in b.iter_mut().enumerate() {
        row[i] -= q;
        for v in row.iter_mut() {
            *v /= p;
        }
    }
    let det = b[0][0] * (b[1][1] * b[2][2] - b[1][2] * b[2][1])
        - b[0][1] * (b[1][0] * b[2][2] - b[1][2] * b[2][0])
        + b[0][2] * (b[1][0] * b[2][1] - b[1][1] * b[2][0]);
    let r = (det / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;

    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * PI / 3.0).cos();
    [largest, 3.0 * q - largest - smallest, smallest]
}

type Point2 = (f64, f64);

fn turn(o: Point2, a: Point2, b: Point2) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull of a point set (Andrew's monotone chain), counter-clockwise.
pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
    let mut points = points
        .iter()
        .copied()
        .sorted_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
        .dedup()
        .collect::<Vec<_>>();
    if points.len() < 3 {
        return points;
    }

    let mut hull: Vec<Point2> = Vec::with_capacity(points.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        for &p in points.iter() {
            while hull.len() >= start + 2 && turn(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
        if pass == 0 {
            points.reverse();
        }
    }
    hull
}

/// Per-slice convex hull vertices of the voxel centres, in mm.
///
/// Only the first and last voxel of every row can be a hull vertex, so rows are
/// reduced to their extremes before the hull is computed.
pub fn slice_hulls(mask: &RegionMask) -> Vec<(f64, Vec<Point2>)> {
    let [sx, sy, sz] = mask.spacing;
    let (depth, rows, _) = mask.mask.dim();
    (0..depth)
        .filter_map(|z| {
            let extremes = (0..rows)
                .filter_map(|y| {
                    let row = mask.mask.slice(ndarray::s![z, y, ..]);
                    let first = row.iter().position(|&v| v)?;
                    let last = row.iter().rposition(|&v| v)?;
                    Some([(first as f64 * sx, y as f64 * sy), (last as f64 * sx, y as f64 * sy)])
                })
                .flatten()
                .collect::<Vec<_>>();
            if extremes.is_empty() {
                None
            } else {
                Some((z as f64 * sz, convex_hull(&extremes)))
            }
        })
        .collect()
}

fn max_distance<T: Copy>(points: &[T], distance: impl Fn(T, T) -> f64) -> f64 {
    points
        .iter()
        .enumerate()
        .flat_map(move |(i, &a)| points[i + 1..].iter().map(move |&b| (a, b)))
        .map(|(a, b)| distance(a, b))
        .fold(0.0, f64::max)
}

/// Largest in-plane distance between voxel centres over all slices.
pub fn max_diameter_2d(hulls: &[(f64, Vec<Point2>)]) -> f64 {
    hulls
        .iter()
        .map(|(_, hull)| max_distance(hull, |a, b| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()))
        .fold(0.0, f64::max)
}

/// Largest distance between any two voxel centres of the region.
pub fn max_diameter_3d(hulls: &[(f64, Vec<Point2>)]) -> f64 {
    let points = hulls
        .iter()
        .flat_map(|(z, hull)| hull.iter().map(move |&(x, y)| [x, y, *z]))
        .collect::<Vec<_>>();
    max_distance(&points, |a: [f64; 3], b: [f64; 3]| {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
    })
}
