//! Local metric projection, chosen once per route.

use proj::Proj;

use crate::error::{Error, Result};

/// Degrees of longitude/latitude covered by one meter at a given location,
/// derived by pushing a point one meter in each axis and reprojecting back.
#[derive(Clone, Copy, Debug)]
pub struct DegreeScale {
    pub lon_per_meter: f64,
    pub lat_per_meter: f64,
}

/// Transverse-mercator projection centered near the route origin so that all
/// downstream meters are mutually comparable. Conversions are inverse
/// consistent within a small epsilon.
pub struct LocalProjection {
    to_local: Proj,
    to_geo: Proj,
}

impl LocalProjection {
    pub fn for_route_origin(lat: f64, lon: f64) -> Result<Self> {
        check_geographic(lat, lon)?;
        let crs = format!(
            "+proj=tmerc +lat_0={lat} +lon_0={lon} +k=1 +x_0=0 +y_0=0 +ellps=WGS84 +units=m +no_defs"
        );
        let to_local = Proj::new_known_crs("EPSG:4326", &crs, None)
            .map_err(|e| Error::Projection(format!("creating local CRS: {e}")))?;
        let to_geo = Proj::new_known_crs(&crs, "EPSG:4326", None)
            .map_err(|e| Error::Projection(format!("creating inverse CRS: {e}")))?;
        Ok(Self { to_local, to_geo })
    }

    /// Geographic degrees to local meters.
    pub fn to_local(&self, lat: f64, lon: f64) -> Result<(f64, f64)> {
        check_geographic(lat, lon)?;
        self.to_local
            .convert((lon, lat))
            .map_err(|e| Error::Projection(format!("({lat}, {lon}): {e}")))
    }

    /// Local meters back to geographic degrees, returned as (lat, lon).
    pub fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (lon, lat) = self
            .to_geo
            .convert((x, y))
            .map_err(|e| Error::Projection(format!("({x}m, {y}m): {e}")))?;
        Ok((lat, lon))
    }

    pub fn degree_scale(&self, lat: f64, lon: f64) -> Result<DegreeScale> {
        let (x, y) = self.to_local(lat, lon)?;
        let (lat_plus, lon_plus) = self.to_geo(x + 1.0, y + 1.0)?;
        Ok(DegreeScale {
            lon_per_meter: (lon_plus - lon).abs(),
            lat_per_meter: (lat_plus - lat).abs(),
        })
    }
}

fn check_geographic(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(Error::Projection(format!("latitude {lat} out of range")));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(Error::Projection(format!("longitude {lon} out of range")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_stays_within_epsilon() {
        let proj = LocalProjection::for_route_origin(41.161758, -8.583933).unwrap();
        for (lat, lon) in [
            (41.161758, -8.583933),
            (41.17, -8.59),
            (41.15, -8.57),
            (41.2, -8.6),
        ] {
            let (x, y) = proj.to_local(lat, lon).unwrap();
            let (lat2, lon2) = proj.to_geo(x, y).unwrap();
            assert!((lat - lat2).abs() < 1e-6, "lat {lat} -> {lat2}");
            assert!((lon - lon2).abs() < 1e-6, "lon {lon} -> {lon2}");
        }
    }

    #[test]
    fn origin_projects_near_zero() {
        let proj = LocalProjection::for_route_origin(10.0, 10.0).unwrap();
        let (x, y) = proj.to_local(10.0, 10.0).unwrap();
        assert!(x.abs() < 1.0);
        assert!(y.abs() < 1.0);
    }

    #[test]
    fn out_of_range_input_is_rejected() {
        assert!(LocalProjection::for_route_origin(91.0, 0.0).is_err());
        let proj = LocalProjection::for_route_origin(0.0, 0.0).unwrap();
        assert!(proj.to_local(0.0, 181.0).is_err());
        assert!(proj.to_local(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn degree_scale_matches_one_meter_offsets() {
        let proj = LocalProjection::for_route_origin(41.161758, -8.583933).unwrap();
        let scale = proj.degree_scale(41.161758, -8.583933).unwrap();
        // one degree of latitude is roughly 111 km
        assert!((scale.lat_per_meter - 1.0 / 111_000.0).abs() < 2e-7);
        assert!(scale.lon_per_meter > scale.lat_per_meter);
    }
}
