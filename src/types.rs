use geo::{MultiPolygon, Point};

/// Administrative boundary of one municipality.
#[derive(Debug, Clone)]
pub struct Municipality {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Agricultural-frontier zoning region.
#[derive(Debug, Clone)]
pub struct ZoningArea {
    pub municipality: String,
    pub category: String,
    pub geometry: MultiPolygon<f64>,
}

/// Synthetic crop planting location. `crop` indexes the configured crop list,
/// `zone` the zoning polygon it was placed in.
#[derive(Debug, Clone, PartialEq)]
pub struct CropPoint {
    pub point: Point<f64>,
    pub crop: usize,
    pub zone: usize,
}

/// Both filtered layers in the target CRS.
#[derive(Debug, Clone)]
pub struct Layers {
    pub boundary: Vec<Municipality>,
    pub zoning: Vec<ZoningArea>,
}
