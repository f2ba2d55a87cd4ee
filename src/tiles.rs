//! Map tile color sampling. Each geographic point maps to a fixed-zoom web
//! tile; the tile image is fetched once per run, cached on disk, and a small
//! pixel neighborhood around the point is averaged into a packed color.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use log::warn;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::mesh::Color;

pub const TILE_ZOOM: u32 = 18;
pub const TILE_SIZE: u32 = 256;
pub const TILE_URL_BASE: &str = "https://tile.openstreetmap.org";

/// Latitude extent of the web-mercator-like tiling scheme.
const LAT_EXTENT_DEGREES: f64 = 85.0511;

/// Pixel neighborhood radius averaged around the target pixel.
const SAMPLE_RADIUS: i64 = 3;

/// Contrast compression: `floor(channel / factor / 2.5) * factor`.
const CONTRAST_FACTOR: f64 = 5.0;

/// Returned when no tile data is available for a point.
pub const FALLBACK_COLOR: Color = Color::from_rgb(128, 128, 128);

const USER_AGENT: &str = concat!("route-scene/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.zoom, self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TilePixel {
    pub addr: TileAddress,
    pub px: u32,
    pub py: u32,
}

/// Locate the tile containing (lon, lat) and the pixel offset inside it.
pub fn locate(lon: f64, lat: f64) -> TilePixel {
    let tiles = (1u64 << TILE_ZOOM) as f64;
    let degrees_per_tile_x = 360.0 / tiles;
    let degrees_per_tile_y = 2.0 * LAT_EXTENT_DEGREES / tiles;

    let x = ((lon + 180.0) / degrees_per_tile_x).floor() as u32;
    let y_remapped = LAT_EXTENT_DEGREES - lat / 180.0 * LAT_EXTENT_DEGREES;
    let y = (y_remapped / degrees_per_tile_y).floor() as u32;

    let remainder_x = (lon + 180.0) % degrees_per_tile_x;
    let remainder_y = y_remapped % degrees_per_tile_y;
    let px = ((remainder_x / degrees_per_tile_x) * TILE_SIZE as f64) as u32;
    let py = ((remainder_y / degrees_per_tile_y) * TILE_SIZE as f64) as u32;

    TilePixel {
        addr: TileAddress { zoom: TILE_ZOOM, x, y },
        px: px.min(TILE_SIZE - 1),
        py: py.min(TILE_SIZE - 1),
    }
}

/// The raw tile transport. Kept behind a trait so tests never hit the network.
pub trait TileFetcher {
    fn fetch(&self, addr: &TileAddress) -> Result<Vec<u8>>;
}

pub struct HttpTileFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTileFetcher {
    pub fn new() -> Result<Self> {
        Self::with_base_url(TILE_URL_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::network(TILE_URL_BASE, e))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, addr: &TileAddress) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/{}/{}.png",
            self.base_url, addr.zoom, addr.x, addr.y
        );
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::network(&url, e))?;
        if !response.status().is_success() {
            return Err(Error::network(&url, format!("status {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| Error::network(&url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Tile byte cache with a caller-controlled lifecycle.
pub trait TileCache {
    fn lookup(&self, key: &str) -> Option<Vec<u8>>;
    fn store(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Disk cache in a scoped temp directory, removed when the cache is dropped.
pub struct DirTileCache {
    dir: TempDir,
}

impl DirTileCache {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("route-scene-tiles-")
            .tempdir()?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{key}.png"))
    }
}

impl TileCache for DirTileCache {
    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path(key)).ok()
    }

    fn store(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.path(key), bytes)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        for entry in fs::read_dir(self.dir.path())? {
            fs::remove_file(entry?.path())?;
        }
        Ok(())
    }
}

/// Samples colors for geographic points from cached map tiles. Failed tiles
/// are remembered so each is attempted at most once per run; their points get
/// [`FALLBACK_COLOR`].
pub struct TileColorSampler<F: TileFetcher, C: TileCache> {
    fetcher: F,
    cache: C,
    failed: HashSet<String>,
}

impl<F: TileFetcher, C: TileCache> TileColorSampler<F, C> {
    pub fn new(fetcher: F, cache: C) -> Self {
        Self {
            fetcher,
            cache,
            failed: HashSet::new(),
        }
    }

    pub fn color_at(&mut self, lon: f64, lat: f64) -> Color {
        let pixel = locate(lon, lat);
        let key = pixel.addr.key();
        if self.failed.contains(&key) {
            return FALLBACK_COLOR;
        }
        let bytes = match self.cache.lookup(&key) {
            Some(bytes) => bytes,
            None => match self.fetcher.fetch(&pixel.addr) {
                Ok(bytes) => {
                    if let Err(e) = self.cache.store(&key, &bytes) {
                        warn!("tile {key}: cache store failed: {e}");
                    }
                    bytes
                }
                Err(e) => {
                    warn!("✗ tile {key}: download failed: {e}");
                    self.failed.insert(key);
                    return FALLBACK_COLOR;
                }
            },
        };
        match average_color(&key, &bytes, pixel.px, pixel.py) {
            Ok(color) => color,
            Err(e) => {
                warn!("✗ {e}");
                self.failed.insert(key);
                FALLBACK_COLOR
            }
        }
    }

    /// Colors for a list of (lon, lat) points, in input order.
    pub fn colors_of(&mut self, points: &[(f64, f64)]) -> Vec<Color> {
        points
            .iter()
            .map(|&(lon, lat)| self.color_at(lon, lat))
            .collect()
    }
}

fn average_color(key: &str, png: &[u8], px: u32, py: u32) -> Result<Color> {
    let image = image::load_from_memory(png)
        .map_err(|e| Error::TileDecode {
            key: key.to_owned(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for dy in -SAMPLE_RADIUS..=SAMPLE_RADIUS {
        for dx in -SAMPLE_RADIUS..=SAMPLE_RADIUS {
            let sx = (px as i64 + dx).clamp(0, width as i64 - 1) as u32;
            let sy = (py as i64 + dy).clamp(0, height as i64 - 1) as u32;
            let p = image.get_pixel(sx, sy);
            sums[0] += p[0] as u64;
            sums[1] += p[1] as u64;
            sums[2] += p[2] as u64;
            count += 1;
        }
    }
    Ok(Color::from_rgb(
        compress(sums[0] as f64 / count as f64),
        compress(sums[1] as f64 / count as f64),
        compress(sums[2] as f64 / count as f64),
    ))
}

fn compress(channel: f64) -> u8 {
    ((channel / CONTRAST_FACTOR / 2.5).floor() * CONTRAST_FACTOR) as u8
}
