//! Building footprints along the route, extruded into closed prisms.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use geo::Point;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::elevation::{ElevationProvider, sample_elevations};
use crate::error::{Error, Result};
use crate::grid::subset_from_list;
use crate::mesh::{Color, Mesh, Point3};
use crate::projection::LocalProjection;
use crate::winding::fix_orientation;

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const BUILDING_COLOR: Color = Color::from_rgb(240, 240, 240);

pub const DEFAULT_HEIGHT_M: f64 = 9.0;
pub const MIN_HEIGHT_M: f64 = 3.0;
pub const METERS_PER_LEVEL: f64 = 3.0;

const QUERY_RETRIES: usize = 3;

pub type Tags = HashMap<String, String>;

/// Geographic bounding box, degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

// Raw footprint-service elements. Nodes carry coordinates, ways carry ordered
// node-id lists, relations stitch member ways into multi-part outer rings.

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node(NodeElement),
    Way(WayElement),
    Relation(RelationElement),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeElement {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WayElement {
    pub id: i64,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationElement {
    pub id: i64,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub way_ref: i64,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct FootprintResponse {
    elements: Vec<Element>,
}

/// Bounding-box query for building-tagged elements. Opaque source; swapped
/// for a fixture in tests.
pub trait FootprintSource {
    fn query_buildings(&self, bbox: &GeoBBox) -> Result<Vec<Element>>;
}

pub struct OverpassClient {
    client: reqwest::blocking::Client,
    url: String,
}

impl OverpassClient {
    pub fn new() -> Result<Self> {
        Self::with_url(OVERPASS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::network(OVERPASS_URL, e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl FootprintSource for OverpassClient {
    fn query_buildings(&self, bbox: &GeoBBox) -> Result<Vec<Element>> {
        let bounds = format!("{},{},{},{}", bbox.south, bbox.west, bbox.north, bbox.east);
        let query = format!(
            "[out:json];\
             (node[\"building\"]({bounds});\
             way[\"building\"]({bounds});\
             relation[\"building\"]({bounds}););\
             out body;>;out skel qt;"
        );
        let mut last_error = None;
        for attempt in 1..=QUERY_RETRIES {
            let result = self
                .client
                .get(&self.url)
                .query(&[("data", query.as_str())])
                .send()
                .map_err(|e| Error::network(&self.url, e))
                .and_then(|response| {
                    if !response.status().is_success() {
                        return Err(Error::network(
                            &self.url,
                            format!("status {}", response.status()),
                        ));
                    }
                    response
                        .json::<FootprintResponse>()
                        .map_err(|e| Error::Parse(e.to_string()))
                });
            match result {
                Ok(body) => return Ok(body.elements),
                Err(e) => {
                    debug!("footprint query attempt {attempt}/{QUERY_RETRIES}: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::network(&self.url, "no attempts made")))
    }
}

/// Where a building's height came from, resolved by one ordered match instead
/// of nested tag fallbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeightSource {
    Height(f64),
    Levels(u32),
    Layer(i32),
    Unknown,
}

impl HeightSource {
    pub fn from_tags(tags: Option<&Tags>) -> Self {
        let Some(tags) = tags else {
            return Self::Unknown;
        };
        if let Some(h) = tags.get("height").and_then(|v| leading_number(v)) {
            return Self::Height(h);
        }
        if let Some(n) = tags.get("building:levels").and_then(|v| leading_number(v)) {
            return Self::Levels(n.max(0.0) as u32);
        }
        if let Some(l) = tags.get("layer").and_then(|v| leading_number(v)) {
            return Self::Layer(l as i32);
        }
        Self::Unknown
    }

    /// Height in meters, clamped to [`MIN_HEIGHT_M`]. Layer-tagged buildings
    /// fall back to the default height; a sign flip for negative layers is
    /// the caller's concern.
    pub fn resolve(self) -> f64 {
        let height = match self {
            Self::Height(h) => h,
            Self::Levels(n) => n as f64 * METERS_PER_LEVEL,
            Self::Layer(_) | Self::Unknown => DEFAULT_HEIGHT_M,
        };
        height.max(MIN_HEIGHT_M)
    }
}

/// First numeric value in a tag like `"12.5 m"`, `"3;4"` or `"9,8"`.
fn leading_number(value: &str) -> Option<f64> {
    let first = value.split([',', ';']).next()?.trim();
    let numeric: String = first
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    numeric.parse().ok()
}

/// A closed footprint ring in local meters with its base elevation. The ring
/// has no implicit closing duplicate.
#[derive(Debug, Clone)]
pub struct Footprint {
    pub ring: Vec<(f64, f64)>,
    pub base_elevation: f64,
    pub height: f64,
}

/// One building candidate before node resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RingCandidate {
    pub id: i64,
    pub node_ids: Vec<i64>,
    pub height: HeightSource,
}

/// Split raw elements into building candidates: tagged ways stand alone,
/// relations concatenate their outer member ways, untagged nodes resolve
/// coordinates. Ids already in `seen_ids` are skipped and new ones recorded.
pub fn assemble_candidates(
    elements: Vec<Element>,
    seen_ids: &mut HashSet<i64>,
) -> (Vec<RingCandidate>, HashMap<i64, (f64, f64)>) {
    let mut nodes: HashMap<i64, (f64, f64)> = HashMap::new();
    let mut candidates = Vec::new();
    let mut way_parts: Vec<WayElement> = Vec::new();
    let mut relations: Vec<RelationElement> = Vec::new();

    for element in elements {
        match element {
            Element::Node(node) => {
                // tagged nodes are POI markers, not ring geometry
                if node.tags.is_none() {
                    nodes.insert(node.id, (node.lat, node.lon));
                }
            }
            Element::Way(way) => {
                let tagged = way
                    .tags
                    .as_ref()
                    .is_some_and(|t| t.contains_key("building"));
                if tagged {
                    if !seen_ids.insert(way.id) {
                        continue;
                    }
                    candidates.push(RingCandidate {
                        id: way.id,
                        node_ids: way.nodes,
                        height: HeightSource::from_tags(way.tags.as_ref()),
                    });
                } else {
                    way_parts.push(way);
                }
            }
            Element::Relation(rel) => relations.push(rel),
        }
    }

    for relation in relations {
        if !seen_ids.insert(relation.id) {
            continue;
        }
        let mut node_ids = Vec::new();
        for member in &relation.members {
            if member.kind != "way" || member.role != "outer" {
                continue;
            }
            if let Some(pos) = way_parts.iter().position(|w| w.id == member.way_ref) {
                node_ids.extend(way_parts.swap_remove(pos).nodes);
            }
        }
        candidates.push(RingCandidate {
            id: relation.id,
            node_ids,
            height: HeightSource::from_tags(relation.tags.as_ref()),
        });
    }

    (candidates, nodes)
}

/// Resolve a candidate's node ids to (lat, lon) coordinates, dropping the
/// closing duplicate id. `None` when fewer than 3 nodes resolve.
pub fn resolve_ring(
    candidate: &RingCandidate,
    nodes: &HashMap<i64, (f64, f64)>,
) -> Option<Vec<(f64, f64)>> {
    let ids = match candidate.node_ids.split_last() {
        Some((_, rest)) => rest,
        None => return None,
    };
    let ring: Vec<(f64, f64)> = ids.iter().filter_map(|id| nodes.get(id).copied()).collect();
    (ring.len() >= 3).then_some(ring)
}

/// Extrude a footprint into a closed prism: bottom cap, top cap, one side
/// quad per edge. Both caps pass through the orientation fixer independently
/// and the side quads follow its verdict, so all normals face outward no
/// matter how the input ring is wound.
pub fn extrude_footprint(footprint: &Footprint) -> Option<Mesh> {
    let n = footprint.ring.len();
    if n < 3 {
        return None;
    }
    let base = footprint.base_elevation;
    let top = base + footprint.height;
    let mut mesh = Mesh::default();

    // bottom cap
    let bottom_ring: Vec<Point3> = footprint
        .ring
        .iter()
        .map(|&(x, y)| [x, y, base])
        .collect();
    for p in &bottom_ring {
        mesh.vertices.extend_from_slice(p);
        mesh.colors.push(BUILDING_COLOR.0);
    }
    let (bottom_indices, _) = fix_orientation(&bottom_ring, (0..n as u32).collect());
    mesh.faces.push(n as u32);
    mesh.faces.extend(&bottom_indices);

    // top cap, reversed after fixing so it faces away from the bottom
    let top_ring: Vec<Point3> = footprint
        .ring
        .iter()
        .map(|&(x, y)| [x, y, top])
        .collect();
    let first_top = mesh.vertex_count() as u32;
    for p in &top_ring {
        mesh.vertices.extend_from_slice(p);
        mesh.colors.push(BUILDING_COLOR.0);
    }
    let (mut top_indices, inverted) =
        fix_orientation(&top_ring, (first_top..first_top + n as u32).collect());
    top_indices.reverse();
    mesh.faces.push(n as u32);
    mesh.faces.extend(&top_indices);

    // side quads
    for i in 0..n {
        let (x, y) = footprint.ring[i];
        let (nx, ny) = footprint.ring[(i + 1) % n];
        let first_side = mesh.vertex_count() as u32;
        mesh.faces.push(4);
        mesh.faces.extend(first_side..first_side + 4);
        let quad = if inverted {
            [[x, y, base], [nx, ny, base], [nx, ny, top], [x, y, top]]
        } else {
            [[x, y, base], [x, y, top], [nx, ny, top], [nx, ny, base]]
        };
        for p in quad {
            mesh.vertices.extend_from_slice(&p);
            mesh.colors.push(BUILDING_COLOR.0);
        }
    }

    Some(mesh)
}

/// Query footprints window by window along the route and extrude each usable
/// ring. Failed windows and degenerate rings are skipped, the rest survive.
pub fn buildings_along_route(
    route: &[Point<f64>],
    proj: &LocalProjection,
    elevation: &dyn ElevationProvider,
    source: &dyn FootprintSource,
    cfg: &PipelineConfig,
) -> Vec<Mesh> {
    let mut seen_ids = HashSet::new();
    let mut meshes = Vec::new();
    let mut window_index = 0;
    while let Some(window) = subset_from_list(route, window_index, cfg.window) {
        window_index += 1;
        let mid = window[window.len() / 2];
        let (lat, lon) = (mid.y(), mid.x());
        let scale = match proj.degree_scale(lat, lon) {
            Ok(scale) => scale,
            Err(e) => {
                warn!("✗ window {window_index}: {e}");
                continue;
            }
        };
        let bbox = GeoBBox {
            south: lat - cfg.radius_m * scale.lat_per_meter,
            west: lon - cfg.radius_m * scale.lon_per_meter,
            north: lat + cfg.radius_m * scale.lat_per_meter,
            east: lon + cfg.radius_m * scale.lon_per_meter,
        };
        let elements = match source.query_buildings(&bbox) {
            Ok(elements) => elements,
            Err(e) => {
                warn!("✗ footprint query for window {window_index} failed: {e}");
                continue;
            }
        };
        let (candidates, nodes) = assemble_candidates(elements, &mut seen_ids);
        for candidate in &candidates {
            let Some(ring_degrees) = resolve_ring(candidate, &nodes) else {
                debug!("footprint {} has fewer than 3 usable nodes", candidate.id);
                continue;
            };
            match footprint_from_ring(&ring_degrees, candidate.height, proj, elevation) {
                Ok(Some(footprint)) => {
                    if let Some(mesh) = extrude_footprint(&footprint) {
                        meshes.push(mesh);
                    }
                }
                Ok(None) => warn!("✗ no base elevation for footprint {}", candidate.id),
                Err(e) => warn!("✗ footprint {}: {e}", candidate.id),
            }
        }
    }
    info!("extruded {} buildings over {window_index} windows", meshes.len());
    meshes
}

/// Project a degree ring to local meters and attach the elevation of its
/// centroid as the base for every node.
fn footprint_from_ring(
    ring_degrees: &[(f64, f64)],
    height: HeightSource,
    proj: &LocalProjection,
    elevation: &dyn ElevationProvider,
) -> Result<Option<Footprint>> {
    let n = ring_degrees.len() as f64;
    let centroid_lat = ring_degrees.iter().map(|(lat, _)| lat).sum::<f64>() / n;
    let centroid_lon = ring_degrees.iter().map(|(_, lon)| lon).sum::<f64>() / n;
    let sampling = sample_elevations(elevation, &[Point::new(centroid_lon, centroid_lat)]);
    let Some(center) = sampling.points.first() else {
        return Ok(None);
    };
    let mut ring = Vec::with_capacity(ring_degrees.len());
    for &(lat, lon) in ring_degrees {
        ring.push(proj.to_local(lat, lon)?);
    }
    Ok(Some(Footprint {
        ring,
        base_elevation: center.elevation,
        height: height.resolve(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::winding::signed_ring_sum;

    fn tags(pairs: &[(&str, &str)]) -> Option<Tags> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn parses_footprint_service_elements() {
        let body = r#"{"elements":[
            {"type":"node","id":1,"lat":41.1,"lon":-8.5},
            {"type":"node","id":2,"lat":41.2,"lon":-8.6,"tags":{"amenity":"cafe"}},
            {"type":"way","id":10,"nodes":[1,2,3,1],"tags":{"building":"yes","height":"12"}},
            {"type":"relation","id":20,"members":[{"type":"way","ref":11,"role":"outer"}],"tags":{"building":"yes"}}
        ]}"#;
        let parsed: FootprintResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.elements.len(), 4);
        match &parsed.elements[2] {
            Element::Way(way) => {
                assert_eq!(way.nodes, vec![1, 2, 3, 1]);
                assert_eq!(
                    HeightSource::from_tags(way.tags.as_ref()),
                    HeightSource::Height(12.0)
                );
            }
            other => panic!("expected way, got {other:?}"),
        }
    }

    #[test]
    fn height_resolution_is_one_ordered_match() {
        let height = tags(&[("height", "12.5 m"), ("building:levels", "4")]);
        assert_eq!(
            HeightSource::from_tags(height.as_ref()),
            HeightSource::Height(12.5)
        );
        let levels = tags(&[("building:levels", "4;2")]);
        assert_eq!(
            HeightSource::from_tags(levels.as_ref()),
            HeightSource::Levels(4)
        );
        assert_eq!(HeightSource::Levels(4).resolve(), 12.0);
        let layer = tags(&[("layer", "-1")]);
        assert_eq!(
            HeightSource::from_tags(layer.as_ref()),
            HeightSource::Layer(-1)
        );
        assert_eq!(HeightSource::Layer(-1).resolve(), DEFAULT_HEIGHT_M);
        assert_eq!(HeightSource::Unknown.resolve(), DEFAULT_HEIGHT_M);
        // clamped to the minimum
        assert_eq!(HeightSource::Height(1.0).resolve(), MIN_HEIGHT_M);
        assert_eq!(HeightSource::Levels(0).resolve(), MIN_HEIGHT_M);
    }

    #[test]
    fn leading_number_tolerates_lists_and_units() {
        assert_eq!(leading_number("9"), Some(9.0));
        assert_eq!(leading_number("12.5 m"), Some(12.5));
        assert_eq!(leading_number("3;4"), Some(3.0));
        assert_eq!(leading_number("7,8"), Some(7.0));
        assert_eq!(leading_number("-2"), Some(-2.0));
        assert_eq!(leading_number("tall"), None);
    }

    #[test]
    fn relations_concatenate_outer_member_ways() {
        let elements = vec![
            Element::Way(WayElement {
                id: 11,
                nodes: vec![1, 2, 3],
                tags: None,
            }),
            Element::Way(WayElement {
                id: 12,
                nodes: vec![3, 4, 1],
                tags: None,
            }),
            Element::Relation(RelationElement {
                id: 20,
                members: vec![
                    Member {
                        kind: "way".into(),
                        way_ref: 11,
                        role: "outer".into(),
                    },
                    Member {
                        kind: "way".into(),
                        way_ref: 99,
                        role: "inner".into(),
                    },
                    Member {
                        kind: "way".into(),
                        way_ref: 12,
                        role: "outer".into(),
                    },
                ],
                tags: tags(&[("building", "yes")]),
            }),
        ];
        let mut seen = HashSet::new();
        let (candidates, _) = assemble_candidates(elements, &mut seen);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].node_ids, vec![1, 2, 3, 3, 4, 1]);
        assert!(seen.contains(&20));
    }

    #[test]
    fn already_seen_ids_are_skipped() {
        let way = Element::Way(WayElement {
            id: 10,
            nodes: vec![1, 2, 3, 1],
            tags: tags(&[("building", "yes")]),
        });
        let mut seen = HashSet::new();
        let (first, _) = assemble_candidates(vec![way.clone()], &mut seen);
        assert_eq!(first.len(), 1);
        let (second, _) = assemble_candidates(vec![way], &mut seen);
        assert!(second.is_empty());
    }

    #[test]
    fn short_rings_resolve_to_none() {
        let mut nodes = HashMap::new();
        nodes.insert(1, (41.1, -8.5));
        nodes.insert(2, (41.2, -8.6));
        let candidate = RingCandidate {
            id: 10,
            node_ids: vec![1, 2, 99, 1],
            height: HeightSource::Unknown,
        };
        // node 99 is unresolved, leaving only 2 usable nodes
        assert!(resolve_ring(&candidate, &nodes).is_none());
    }

    #[test]
    fn square_footprint_extrudes_to_six_faces() {
        let footprint = Footprint {
            ring: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            base_elevation: 0.0,
            height: 9.0,
        };
        let mesh = extrude_footprint(&footprint).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.face_count(), 6);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.colors.len(), 24);

        // caps are wound opposite ways
        let ring_of = |indices: &[u32]| -> Vec<Point3> {
            indices
                .iter()
                .map(|&i| {
                    let i = i as usize * 3;
                    [mesh.vertices[i], mesh.vertices[i + 1], mesh.vertices[i + 2]]
                })
                .collect()
        };
        let bottom = ring_of(&mesh.faces[1..5]);
        let top = ring_of(&mesh.faces[6..10]);
        assert!(signed_ring_sum(&bottom) >= 0.0);
        assert!(signed_ring_sum(&top) <= 0.0);
        assert!(bottom.iter().all(|p| p[2] == 0.0));
        assert!(top.iter().all(|p| p[2] == 9.0));
    }

    #[test]
    fn degenerate_footprint_produces_no_mesh() {
        let footprint = Footprint {
            ring: vec![(0.0, 0.0), (10.0, 0.0)],
            base_elevation: 0.0,
            height: 9.0,
        };
        assert!(extrude_footprint(&footprint).is_none());
    }
}
