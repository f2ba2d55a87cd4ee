//! Road ribbon: the route polyline offset into a buffered polygon, draped
//! just above the terrain.

use geo::{Geometry as GeoGeometry, LineString};
use geos::{BufferParams, BufferParamsBuilder, CapStyle, Geom, Geometry};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::grid::subset_from_list;
use crate::mesh::{Color, Mesh, Point3};

pub const ROAD_COLOR: Color = Color::from_rgb(155, 50, 50);

/// Ribbon vertices float this far above their source point.
pub const ELEVATION_CLEARANCE_M: f64 = 0.2;

const QUADRANT_SEGMENTS: i32 = 8;

/// Buffer the 3D route into one ribbon mesh. The route is processed in
/// bounded windows to keep each buffering operation small; every boundary
/// vertex takes the elevation of the closest source point in its window plus
/// a fixed clearance. Windows whose buffered boundary degenerates to fewer
/// than 3 points contribute nothing.
pub fn road_ribbon(route: &[Point3], width: f64, window: usize) -> Mesh {
    let mut mesh = Mesh::default();
    let mut window_index = 0;
    let mut skipped = 0;
    while let Some(points) = subset_from_list(route, window_index, window) {
        window_index += 1;
        let ring = match buffered_ring(points, width) {
            Ok(ring) => ring,
            Err(e) => {
                warn!("✗ ribbon window {window_index}: {e}");
                skipped += 1;
                continue;
            }
        };
        if ring.len() < 3 {
            skipped += 1;
            continue;
        }
        let face: Vec<Point3> = ring
            .iter()
            .map(|&(x, y)| {
                let source = nearest_source(x, y, points);
                [x, y, source[2] + ELEVATION_CLEARANCE_M]
            })
            .collect();
        mesh.push_face(&face, &vec![ROAD_COLOR; face.len()]);
    }
    if skipped > 0 {
        debug!("ribbon skipped {skipped} of {window_index} windows");
    }
    mesh
}

/// Square-capped offset polygon around the window's 2D projection. Returns
/// the exterior ring without its closing duplicate.
fn buffered_ring(points: &[Point3], width: f64) -> Result<Vec<(f64, f64)>> {
    let line = LineString::from(
        points
            .iter()
            .map(|p| (p[0], p[1]))
            .collect::<Vec<(f64, f64)>>(),
    );
    let geometry =
        Geometry::try_from(&line).map_err(|e| Error::Geometry(format!("geos conversion: {e}")))?;
    let params: BufferParams = BufferParamsBuilder::default()
        .end_cap_style(CapStyle::Square)
        .quadrant_segments(QUADRANT_SEGMENTS)
        .build()
        .map_err(|e| Error::Geometry(format!("buffer params: {e}")))?;
    let buffered = geometry
        .buffer_with_params(width, &params)
        .map_err(|e| Error::Geometry(format!("buffer failed: {e}")))?;
    let buffered =
        GeoGeometry::try_from(&buffered).map_err(|e| Error::Geometry(format!("geos -> geo: {e}")))?;
    let polygon = match buffered {
        GeoGeometry::Polygon(polygon) => polygon,
        other => {
            return Err(Error::Geometry(format!(
                "buffer produced {other:?} instead of a polygon"
            )));
        }
    };
    let mut ring: Vec<(f64, f64)> = polygon.exterior().coords().map(|c| (c.x, c.y)).collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    Ok(ring)
}

fn nearest_source<'a>(x: f64, y: f64, sources: &'a [Point3]) -> &'a Point3 {
    sources
        .iter()
        .min_by(|a, b| {
            let da = (a[0] - x).powi(2) + (a[1] - y).powi(2);
            let db = (b[0] - x).powi(2) + (b[1] - y).powi(2);
            da.total_cmp(&db)
        })
        .expect("windows always hold at least 2 points")
}
