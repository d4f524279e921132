//! CRS reprojection of loaded layers.
//!
//! Identical source and target CRS is an identity transform. Anything else goes
//! through PROJ, which is only linked when the `proj` feature is enabled.

use geo::MultiPolygon;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Cannot transform {from} to {to}: built without the default `proj` feature")]
    ProjNotAvailable { from: String, to: String },
}

enum Transform {
    Identity,
    #[cfg(feature = "proj")]
    Proj(proj::Proj),
}

pub struct Reprojector {
    from: String,
    to: String,
    transform: Transform,
}

fn same_crs(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl Reprojector {
    pub fn new(from: &str, to: &str) -> Result<Self, ProjectionError> {
        let transform = if same_crs(from, to) {
            Transform::Identity
        } else {
            Self::proj_transform(from, to)?
        };
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            transform,
        })
    }

    #[cfg(feature = "proj")]
    fn proj_transform(from: &str, to: &str) -> Result<Transform, ProjectionError> {
        let proj = proj::Proj::new_known_crs(from, to, None)
            .map_err(|e| ProjectionError::Projection(format!("Failed to create transform: {}", e)))?;
        Ok(Transform::Proj(proj))
    }

    #[cfg(not(feature = "proj"))]
    fn proj_transform(from: &str, to: &str) -> Result<Transform, ProjectionError> {
        Err(ProjectionError::ProjNotAvailable {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.transform, Transform::Identity)
    }

    pub fn apply(&self, geometry: MultiPolygon<f64>) -> Result<MultiPolygon<f64>, ProjectionError> {
        match &self.transform {
            Transform::Identity => Ok(geometry),
            #[cfg(feature = "proj")]
            Transform::Proj(proj) => {
                use geo::{Coord, MapCoords};

                geometry.try_map_coords(|c: Coord<f64>| {
                    let (x, y) = proj.convert((c.x, c.y)).map_err(|e| {
                        ProjectionError::Projection(format!(
                            "{} -> {} failed at ({}, {}): {}",
                            self.from, self.to, c.x, c.y, e
                        ))
                    })?;
                    Ok(Coord { x, y })
                })
            }
        }
    }

    pub fn describe(&self) -> String {
        format!("{} -> {}", self.from, self.to)
    }
}
