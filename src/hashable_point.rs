//! Quantized coordinate keys. Set membership over raw floats is fragile, so
//! every deduplication in the pipeline goes through one of these integer keys.

use crate::mesh::Point3;

/// Geographic lattice resolution: 1e-5 degrees, roughly a meter at the
/// equator.
pub const DEGREE_QUANT: f64 = 100_000.0;

/// Local metric lattice resolution for subdivision sample points.
const SAMPLE_QUANT: f64 = 1_000_000.0;

/// A lon/lat pair snapped to the 1e-5 degree lattice. The grid sampler emits
/// points directly on this lattice, so the key is exact, not approximate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct QuantizedLonLat {
    pub lon_q: i64,
    pub lat_q: i64,
}

impl QuantizedLonLat {
    pub fn new(lon_q: i64, lat_q: i64) -> Self {
        Self { lon_q, lat_q }
    }

    pub fn of_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon_q: (lon * DEGREE_QUANT).round() as i64,
            lat_q: (lat * DEGREE_QUANT).round() as i64,
        }
    }

    pub fn lon(&self) -> f64 {
        self.lon_q as f64 / DEGREE_QUANT
    }

    pub fn lat(&self) -> f64 {
        self.lat_q as f64 / DEGREE_QUANT
    }
}

/// Key for a 3D sample point in local meters, quantized to a micrometer.
/// Subdivision derives every shared point with the same arithmetic, so equal
/// points land in the same cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SampleKey([i64; 3]);

impl SampleKey {
    pub fn of(p: &Point3) -> Self {
        Self([
            (p[0] * SAMPLE_QUANT).round() as i64,
            (p[1] * SAMPLE_QUANT).round() as i64,
            (p[2] * SAMPLE_QUANT).round() as i64,
        ])
    }
}
