mod buffer;
mod buildings;
mod config;
mod elevation;
mod error;
mod grid;
mod hashable_point;
mod mesh;
mod parsers;
mod projection;
mod scene;
mod subdivide;
mod terrain;
mod tiles;
mod triangulate;
mod winding;

use std::path::Path;

use log::{info, warn};

use buffer::road_ribbon;
use buildings::{OverpassClient, buildings_along_route};
use config::PipelineConfig;
use elevation::{OpenElevationClient, sample_elevations};
use error::Error;
use mesh::Point3;
use parsers::{RouteSource, fit::FitParser, gpx::GpxParser};
use projection::LocalProjection;
use scene::{Scene, write_scene};
use terrain::terrain_mesh;
use tiles::{DirTileCache, HttpTileFetcher, TileColorSampler};

pub const DATA_DIR: &str = "data";
pub const SCENE_PATH: &str = "data/scene.json";

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = PipelineConfig::default();
    let data_dir = Path::new(DATA_DIR);

    let sources: Vec<Box<dyn RouteSource>> = vec![Box::new(GpxParser), Box::new(FitParser)];

    let mut route = Vec::new();
    for source in &sources {
        match source.parse(data_dir) {
            Ok(mut points) => {
                info!("✓ {} extracted {} points", source.name(), points.len());
                route.append(&mut points);
            }
            Err(e) => {
                warn!("✗ {} failed: {}", source.name(), e);
            }
        }
    }

    if route.is_empty() {
        info!("No route points found, nothing to do.");
        return Ok(());
    }
    info!("Collected {} route points", route.len());

    // one local metric frame per run, centered on the route start
    let origin = route[0];
    let proj = LocalProjection::for_route_origin(origin.y(), origin.x())?;

    let elevation = OpenElevationClient::new()?;
    let mut colors = TileColorSampler::new(HttpTileFetcher::new()?, DirTileCache::new()?);

    let terrain = terrain_mesh(&route, &proj, &elevation, &mut colors, &cfg)?;
    info!(
        "✓ terrain: {} triangles, {} faces ({} elevation points dropped)",
        terrain.triangle_count,
        terrain.mesh.face_count(),
        terrain.dropped_elevations
    );

    // the ribbon follows the route itself, so the route points get elevations too
    let route_sampling = sample_elevations(&elevation, &route);
    if route_sampling.dropped > 0 {
        warn!("{} route points dropped from the ribbon", route_sampling.dropped);
    }
    let mut route_3d: Vec<Point3> = Vec::with_capacity(route_sampling.points.len());
    for p in &route_sampling.points {
        let (x, y) = proj.to_local(p.lat, p.lon)?;
        route_3d.push([x, y, p.elevation]);
    }
    let ribbon = road_ribbon(&route_3d, cfg.ribbon_width_m, cfg.ribbon_window);
    info!("✓ ribbon: {} faces", ribbon.face_count());

    let overpass = OverpassClient::new()?;
    let building_meshes = buildings_along_route(&route, &proj, &elevation, &overpass, &cfg);

    let scene = Scene::new(terrain.mesh, ribbon, building_meshes);
    scene.validate()?;
    write_scene(&scene, SCENE_PATH)?;
    info!("✓ wrote {} meshes to {}", scene.mesh_count(), SCENE_PATH);

    Ok(())
}
