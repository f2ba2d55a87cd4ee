//! Recursive triangle subdivision used to densify color sampling. The
//! elevation of every derived point is interpolated from the parent triangle,
//! so no extra elevation queries happen here.

use std::collections::HashSet;

use crate::hashable_point::SampleKey;
use crate::mesh::{Point3, Triangle3D};

pub fn centroid(t: &Triangle3D) -> Point3 {
    let [a, b, c] = t.points;
    [
        (a[0] + b[0] + c[0]) / 3.0,
        (a[1] + b[1] + c[1]) / 3.0,
        (a[2] + b[2] + c[2]) / 3.0,
    ]
}

/// Componentwise `min + |diff| / 2`, which equals the true midpoint but keeps
/// the derivation bit-identical everywhere a shared point is recomputed.
pub fn edge_midpoint(a: &Point3, b: &Point3) -> Point3 {
    [
        a[0].min(b[0]) + (a[0] - b[0]).abs() / 2.0,
        a[1].min(b[1]) + (a[1] - b[1]).abs() / 2.0,
        a[2].min(b[2]) + (a[2] - b[2]).abs() / 2.0,
    ]
}

/// Split a triangle into 6 children around its centroid and edge midpoints:
/// two per edge, `(vertex, centroid, midpoint)` and
/// `(next vertex, midpoint, centroid)`.
pub fn subdivide(t: &Triangle3D) -> [Triangle3D; 6] {
    let center = centroid(t);
    let mut children = [*t; 6];
    for k in 0..3 {
        let vertex = t.points[k];
        let next = t.points[(k + 1) % 3];
        let mid = edge_midpoint(&vertex, &next);
        children[2 * k] = Triangle3D::new(vertex, center, mid);
        children[2 * k + 1] = Triangle3D::new(next, mid, center);
    }
    children
}

/// The triangles that become mesh faces: 6 children, or 36 grandchildren when
/// `deep` is set.
pub fn leaves(t: &Triangle3D, deep: bool) -> Vec<Triangle3D> {
    let children = subdivide(t);
    if !deep {
        return children.to_vec();
    }
    children.iter().flat_map(subdivide).collect()
}

/// Every distinct point a subdivision of `t` can reference: the vertices,
/// centroid, and edge midpoints of the triangle and, when `deep`, of each of
/// its 6 children. Deduplicated by quantized key.
pub fn sample_points(t: &Triangle3D, deep: bool) -> Vec<Point3> {
    let mut seen = HashSet::new();
    let mut points = Vec::new();
    collect(t, &mut seen, &mut points);
    if deep {
        for child in subdivide(t) {
            collect(&child, &mut seen, &mut points);
        }
    }
    points
}

fn collect(t: &Triangle3D, seen: &mut HashSet<SampleKey>, out: &mut Vec<Point3>) {
    let mut push = |p: Point3, seen: &mut HashSet<SampleKey>, out: &mut Vec<Point3>| {
        if seen.insert(SampleKey::of(&p)) {
            out.push(p);
        }
    };
    for p in t.points {
        push(p, seen, out);
    }
    push(centroid(t), seen, out);
    for k in 0..3 {
        push(
            edge_midpoint(&t.points[k], &t.points[(k + 1) % 3]),
            seen,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Triangle3D {
        Triangle3D::new([0.0, 0.0, 10.0], [60.0, 0.0, 16.0], [0.0, 90.0, 22.0])
    }

    #[test]
    fn midpoint_formula_equals_true_average() {
        let a = [3.0, -7.0, 10.0];
        let b = [-1.0, 5.0, 2.0];
        let mid = edge_midpoint(&a, &b);
        assert_eq!(mid, [1.0, -1.0, 6.0]);
        assert_eq!(mid, edge_midpoint(&b, &a));
    }

    #[test]
    fn six_children_cover_the_parent_area() {
        let t = triangle();
        let children = subdivide(&t);
        let area = |t: &Triangle3D| {
            let [a, b, c] = t.points;
            ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs() / 2.0
        };
        let total: f64 = children.iter().map(area).sum();
        assert!((total - area(&t)).abs() < 1e-9);
    }

    #[test]
    fn deep_subdivision_yields_36_leaves() {
        let t = triangle();
        assert_eq!(leaves(&t, false).len(), 6);
        assert_eq!(leaves(&t, true).len(), 36);
    }

    #[test]
    fn sample_points_are_unique_and_cover_all_leaf_vertices() {
        let t = triangle();
        for deep in [false, true] {
            let samples = sample_points(&t, deep);
            let keys: HashSet<SampleKey> = samples.iter().map(SampleKey::of).collect();
            assert_eq!(keys.len(), samples.len());
            for leaf in leaves(&t, deep) {
                for vertex in leaf.points {
                    assert!(
                        keys.contains(&SampleKey::of(&vertex)),
                        "leaf vertex {vertex:?} not sampled (deep={deep})"
                    );
                }
            }
        }
        // shallow: 3 vertices, centroid, 3 midpoints
        assert_eq!(sample_points(&t, false).len(), 7);
    }
}
