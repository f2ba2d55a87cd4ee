/// Pipeline knobs. Defaults match the scenes this was tuned against: a 100 m
/// sampling radius around each route window, 20-point windows for terrain and
/// buildings, 10-point windows for the road ribbon, and a grid step of 40
/// quantized units (4e-4 degrees) between elevation samples.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sampling radius in meters around each window midpoint.
    pub radius_m: f64,
    /// Route points consumed per terrain / building window.
    pub window: usize,
    /// Grid step between candidate sample points, in quantized degree units.
    pub grid_step: usize,
    /// Route points consumed per road ribbon window.
    pub ribbon_window: usize,
    /// Half-width of the road ribbon in meters.
    pub ribbon_width_m: f64,
    /// Subdivide terrain triangles twice (36 leaves) instead of once (6).
    pub deep_subdivision: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            radius_m: 100.0,
            window: 20,
            grid_step: 40,
            ribbon_window: 10,
            ribbon_width_m: 4.0,
            deep_subdivision: true,
        }
    }
}
