//! Terrain pipeline: sampling grid to colored, draped surface mesh.

use std::collections::HashMap;

use geo::Point;
use indicatif::ProgressBar;
use log::info;

use crate::config::PipelineConfig;
use crate::elevation::{ElevationProvider, sample_elevations};
use crate::error::Result;
use crate::grid::sample_grid;
use crate::hashable_point::SampleKey;
use crate::mesh::{Color, Mesh};
use crate::projection::LocalProjection;
use crate::subdivide::{leaves, sample_points};
use crate::tiles::{FALLBACK_COLOR, TileCache, TileColorSampler, TileFetcher};
use crate::triangulate::{GridVertex, triangulate};

#[derive(Debug)]
pub struct TerrainOutcome {
    pub mesh: Mesh,
    pub triangle_count: usize,
    pub dropped_elevations: usize,
}

/// Build the terrain mesh for a route: sample a dense grid around it, attach
/// elevations, triangulate in local meters, then subdivide each triangle and
/// color every subdivision vertex from the map tiles.
pub fn terrain_mesh<F: TileFetcher, C: TileCache>(
    route: &[Point<f64>],
    proj: &LocalProjection,
    elevation: &dyn ElevationProvider,
    colors: &mut TileColorSampler<F, C>,
    cfg: &PipelineConfig,
) -> Result<TerrainOutcome> {
    let grid = sample_grid(route, proj, cfg)?;
    info!("sampling elevation for {} grid points", grid.len());
    let sampling = sample_elevations(elevation, &grid);

    let mut vertices = Vec::with_capacity(sampling.points.len());
    for p in &sampling.points {
        let (x, y) = proj.to_local(p.lat, p.lon)?;
        vertices.push(GridVertex {
            x,
            y,
            z: p.elevation,
        });
    }
    let triangles = triangulate(vertices, 2.0 * cfg.radius_m)?;
    info!("triangulated {} terrain triangles", triangles.len());

    let mut mesh = Mesh::default();
    let progress = ProgressBar::new(triangles.len() as u64);
    for triangle in &triangles {
        let samples = sample_points(triangle, cfg.deep_subdivision);
        let mut geo_points = Vec::with_capacity(samples.len());
        for point in &samples {
            let (lat, lon) = proj.to_geo(point[0], point[1])?;
            geo_points.push((lon, lat));
        }
        let sample_colors = colors.colors_of(&geo_points);
        let palette: HashMap<SampleKey, Color> = samples
            .iter()
            .map(SampleKey::of)
            .zip(sample_colors)
            .collect();
        for leaf in leaves(triangle, cfg.deep_subdivision) {
            let leaf_colors = leaf.points.map(|p| {
                palette
                    .get(&SampleKey::of(&p))
                    .copied()
                    .unwrap_or(FALLBACK_COLOR)
            });
            mesh.push_face(&leaf.points, &leaf_colors);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(TerrainOutcome {
        mesh,
        triangle_count: triangles.len(),
        dropped_elevations: sampling.dropped,
    })
}
