//! Dense planar sampling grid around the route.

use std::collections::HashSet;

use geo::Point;
use log::debug;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::hashable_point::{DEGREE_QUANT, QuantizedLonLat};
use crate::projection::LocalProjection;

/// Forward-looking window starting at `i * k`, at most `k + 1` points long so
/// consecutive windows share one point. `None` once a window would shrink to
/// a single point.
pub fn subset_from_list<T>(list: &[T], i: usize, k: usize) -> Option<&[T]> {
    let start = i.checked_mul(k)?;
    let remaining = list.len().saturating_sub(start);
    if remaining <= 1 {
        return None;
    }
    Some(&list[start..start + remaining.min(k + 1)])
}

/// Partition the route into windows and emit every lattice coordinate inside
/// a box of side `2 * radius` meters around each window midpoint, stepping
/// `grid_step` lattice units and deduplicating across all windows. The final
/// set does not depend on window processing order.
pub fn sample_grid(
    route: &[Point<f64>],
    proj: &LocalProjection,
    cfg: &PipelineConfig,
) -> Result<Vec<Point<f64>>> {
    let mut seen: HashSet<QuantizedLonLat> = HashSet::new();
    let mut grid = Vec::new();
    let mut window_index = 0;
    while let Some(window) = subset_from_list(route, window_index, cfg.window) {
        window_index += 1;
        let mid = window[window.len() / 2];
        let (lat, lon) = (mid.y(), mid.x());
        let scale = proj.degree_scale(lat, lon)?;
        let half_lat = cfg.radius_m * scale.lat_per_meter;
        let half_lon = cfg.radius_m * scale.lon_per_meter;

        let lon_q0 = ((lon - half_lon) * DEGREE_QUANT).floor() as i64;
        let lon_q1 = ((lon + half_lon) * DEGREE_QUANT).ceil() as i64;
        let lat_q0 = ((lat - half_lat) * DEGREE_QUANT).floor() as i64;
        let lat_q1 = ((lat + half_lat) * DEGREE_QUANT).ceil() as i64;

        for lon_q in (lon_q0..lon_q1).step_by(cfg.grid_step) {
            for lat_q in (lat_q0..lat_q1).step_by(cfg.grid_step) {
                let key = QuantizedLonLat::new(lon_q, lat_q);
                if seen.insert(key) {
                    grid.push(Point::new(key.lon(), key.lat()));
                }
            }
        }
    }
    debug!("grid sampler emitted {} points over {} windows", grid.len(), window_index);
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_point_route() -> Vec<Point<f64>> {
        // points are (lon, lat)
        vec![
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(-8.583933, 41.161758),
        ]
    }

    #[test]
    fn subsets_stride_and_terminate() {
        let items: Vec<u32> = (0..45).collect();
        let first = subset_from_list(&items, 0, 20).unwrap();
        assert_eq!(first.len(), 21);
        let second = subset_from_list(&items, 1, 20).unwrap();
        assert_eq!(second.len(), 21);
        assert_eq!(first.last(), Some(&20));
        assert_eq!(second.first(), Some(&20));
        let third = subset_from_list(&items, 2, 20).unwrap();
        assert_eq!(third.len(), 5);
        assert!(subset_from_list(&items, 3, 20).is_none());
        // a leftover single point never forms a window
        let short: Vec<u32> = (0..21).collect();
        assert!(subset_from_list(&short, 1, 20).is_none());
    }

    #[test]
    fn emits_points_near_each_window_midpoint_without_duplicates() {
        let route = three_point_route();
        let proj = LocalProjection::for_route_origin(10.0, 10.0).unwrap();
        let cfg = PipelineConfig {
            window: 1,
            ..PipelineConfig::default()
        };
        // two windows: midpoints (20, 20) and (41.161758, -8.583933)
        let grid = sample_grid(&route, &proj, &cfg).unwrap();
        assert!(!grid.is_empty());
        for (lon, lat) in [(20.0, 20.0), (-8.583933, 41.161758)] {
            let near = grid
                .iter()
                .any(|p| (p.x() - lon).abs() < 0.01 && (p.y() - lat).abs() < 0.01);
            assert!(near, "no grid point near ({lon}, {lat})");
        }
        let keys: HashSet<QuantizedLonLat> = grid
            .iter()
            .map(|p| QuantizedLonLat::of_degrees(p.x(), p.y()))
            .collect();
        assert_eq!(keys.len(), grid.len());
    }

    #[test]
    fn sampling_is_idempotent() {
        let route = three_point_route();
        let proj = LocalProjection::for_route_origin(10.0, 10.0).unwrap();
        let cfg = PipelineConfig::default();
        let sort = |mut pts: Vec<Point<f64>>| {
            pts.sort_by(|a, b| (a.x(), a.y()).partial_cmp(&(b.x(), b.y())).unwrap());
            pts
        };
        let first = sort(sample_grid(&route, &proj, &cfg).unwrap());
        let second = sort(sample_grid(&route, &proj, &cfg).unwrap());
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
