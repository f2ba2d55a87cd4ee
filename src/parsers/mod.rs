pub mod fit;
pub mod gpx;

use geo::Point;
use std::path::Path;

// extract an ordered route of (lon, lat) degree points from activity exports
pub trait RouteSource {
    fn parse(&self, data_dir: &Path) -> Result<Vec<Point>, Box<dyn std::error::Error>>;

    fn name(&self) -> &'static str;
}
