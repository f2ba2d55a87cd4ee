//! Winding correction for polygon rings.

use crate::mesh::Point3;

/// Shoelace-style sum over the cyclic ring, `Σ (x[i+1]-x[i])·(y[i+1]+y[i])`.
/// Negative means the ring runs counter-clockwise in the xy plane.
pub fn signed_ring_sum(ring: &[Point3]) -> f64 {
    let mut sum = 0.0;
    for k in 0..ring.len() {
        let next = (k + 1) % ring.len();
        sum += (ring[next][0] - ring[k][0]) * (ring[next][1] + ring[k][1]);
    }
    sum
}

/// Reverse `indices` when the ring is wound the wrong way. The returned flag
/// tells the caller whether a reversal happened, so side walls built against
/// this ring can mirror their vertex order and keep normals consistent.
pub fn fix_orientation(ring: &[Point3], mut indices: Vec<u32>) -> (Vec<u32>, bool) {
    if signed_ring_sum(ring) < 0.0 {
        indices.reverse();
        (indices, true)
    } else {
        (indices, false)
    }
}
