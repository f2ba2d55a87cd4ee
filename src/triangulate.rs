//! Delaunay triangulation of the elevated sampling grid.

use log::debug;
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};

use crate::error::{Error, Result};
use crate::mesh::Triangle3D;

/// A grid point in local meters with its elevation. The elevation rides along
/// through the triangulation by identity, never by spatial lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridVertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl HasPosition for GridVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

fn edge_length(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Unconstrained 2D Delaunay triangulation over the (x, y) projections.
/// Triangles with any planar edge longer than `max_edge` are discarded and
/// never reach the mesh.
pub fn triangulate(vertices: Vec<GridVertex>, max_edge: f64) -> Result<Vec<Triangle3D>> {
    if vertices.len() < 3 {
        return Err(Error::Geometry(format!(
            "triangulation needs at least 3 points, got {}",
            vertices.len()
        )));
    }
    let tin = DelaunayTriangulation::<GridVertex>::bulk_load(vertices)
        .map_err(|e| Error::Geometry(format!("triangulation rejected input: {e:?}")))?;

    let mut triangles = Vec::with_capacity(tin.num_inner_faces());
    let mut discarded = 0;
    for face in tin.inner_faces() {
        let [a, b, c] = face.vertices().map(|v| {
            let v = v.data();
            [v.x, v.y, v.z]
        });
        let oversized = edge_length(&a, &b) > max_edge
            || edge_length(&b, &c) > max_edge
            || edge_length(&c, &a) > max_edge;
        if oversized {
            discarded += 1;
            continue;
        }
        triangles.push(Triangle3D::new(a, b, c));
    }
    if discarded > 0 {
        debug!("discarded {discarded} triangles with edges over {max_edge}m");
    }
    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_triangle_is_discarded() {
        let vertices = vec![
            GridVertex { x: 0.0, y: 0.0, z: 0.0 },
            GridVertex { x: 200.0, y: 0.0, z: 0.0 },
            GridVertex { x: 0.0, y: 200.0, z: 0.0 },
        ];
        // radius 50: the 200m edges exceed 2 * 50
        let triangles = triangulate(vertices, 100.0).unwrap();
        assert!(triangles.is_empty());
    }

    #[test]
    fn every_emitted_edge_is_within_bound() {
        let mut vertices = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                vertices.push(GridVertex {
                    x: i as f64 * 40.0,
                    y: j as f64 * 40.0,
                    z: (i + j) as f64,
                });
            }
        }
        let max_edge = 200.0;
        let triangles = triangulate(vertices, max_edge).unwrap();
        assert!(!triangles.is_empty());
        for t in &triangles {
            let [a, b, c] = t.points;
            for (p, q) in [(a, b), (b, c), (c, a)] {
                assert!(edge_length(&p, &q) <= max_edge);
            }
        }
    }

    #[test]
    fn elevation_rides_along_by_identity() {
        let vertices = vec![
            GridVertex { x: 0.0, y: 0.0, z: 7.0 },
            GridVertex { x: 10.0, y: 0.0, z: 8.0 },
            GridVertex { x: 0.0, y: 10.0, z: 9.0 },
        ];
        let triangles = triangulate(vertices, 100.0).unwrap();
        assert_eq!(triangles.len(), 1);
        let mut zs: Vec<f64> = triangles[0].points.iter().map(|p| p[2]).collect();
        zs.sort_by(f64::total_cmp);
        assert_eq!(zs, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let vertices = vec![
            GridVertex { x: 0.0, y: 0.0, z: 0.0 },
            GridVertex { x: 1.0, y: 0.0, z: 0.0 },
        ];
        assert!(triangulate(vertices, 10.0).is_err());
    }
}
