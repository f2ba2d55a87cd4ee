//! Batched elevation lookup.

use std::time::Duration;

use geo::Point;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const OPEN_ELEVATION_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

/// Upper bound the elevation service accepts per request.
pub const MAX_BATCH: usize = 10_000;

/// Attempts per chunk before its points are given up on.
pub const CHUNK_RETRIES: usize = 5;

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

/// One service result. Elevation may be missing, which is surfaced as a
/// dropped point rather than silently treated as zero.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupResult {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

/// A geographic point with its elevation attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevatedPoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
}

/// One elevation batch, at most [`MAX_BATCH`] points. Implementations return
/// results in input order so callers can keep polylines aligned.
pub trait ElevationProvider {
    fn elevations(&self, batch: &[Point<f64>]) -> Result<Vec<LookupResult>>;
}

pub struct OpenElevationClient {
    client: reqwest::blocking::Client,
    url: String,
}

impl OpenElevationClient {
    pub fn new() -> Result<Self> {
        Self::with_url(OPEN_ELEVATION_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::network(OPEN_ELEVATION_URL, e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ElevationProvider for OpenElevationClient {
    fn elevations(&self, batch: &[Point<f64>]) -> Result<Vec<LookupResult>> {
        let request = LookupRequest {
            locations: batch
                .iter()
                .map(|p| Location {
                    latitude: p.y(),
                    longitude: p.x(),
                })
                .collect(),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| Error::network(&self.url, e))?;
        if !response.status().is_success() {
            return Err(Error::network(
                &self.url,
                format!("status {}", response.status()),
            ));
        }
        let body: LookupResponse = response.json().map_err(|e| Error::Parse(e.to_string()))?;
        Ok(body.results)
    }
}

/// Elevation-augmented points plus the number of inputs that never resolved,
/// either because their chunk kept failing or because the service returned no
/// elevation for them.
#[derive(Debug)]
pub struct ElevationSampling {
    pub points: Vec<ElevatedPoint>,
    pub dropped: usize,
}

/// Split `points` into sequential chunks of at most [`MAX_BATCH`], query each
/// with up to [`CHUNK_RETRIES`] attempts, and collect whatever resolved.
/// Duplicates are not removed here; that is the grid sampler's job upstream.
pub fn sample_elevations(
    provider: &dyn ElevationProvider,
    points: &[Point<f64>],
) -> ElevationSampling {
    let mut out = Vec::with_capacity(points.len());
    let mut dropped = 0;
    for chunk in points.chunks(MAX_BATCH) {
        let mut results = None;
        for attempt in 1..=CHUNK_RETRIES {
            match provider.elevations(chunk) {
                Ok(r) => {
                    results = Some(r);
                    break;
                }
                Err(e) => warn!("elevation attempt {attempt}/{CHUNK_RETRIES}: {e}"),
            }
        }
        match results {
            Some(results) => {
                for r in results {
                    match r.elevation {
                        Some(elevation) => out.push(ElevatedPoint {
                            lat: r.latitude,
                            lon: r.longitude,
                            elevation,
                        }),
                        None => dropped += 1,
                    }
                }
            }
            None => {
                warn!(
                    "✗ giving up on a chunk of {} points after {CHUNK_RETRIES} attempts",
                    chunk.len()
                );
                dropped += chunk.len();
            }
        }
    }
    if dropped > 0 {
        warn!("{dropped} points resolved no elevation and were dropped");
    }
    ElevationSampling { points: out, dropped }
}
