use crate::config::{AppConfig, FilterConfig};
use crate::projection::Reprojector;
use crate::types::{Layers, Municipality, ZoningArea};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Attribute field '{field}' not found in {path:?}")]
    MissingField { field: String, path: PathBuf },

    #[error("No {layer} matched {filter}")]
    EmptyFilter { layer: &'static str, filter: String },

    #[error("Unsupported geometry format: {0}")]
    UnsupportedFormat(String),

    #[error("Input geometry file has no extension: {0:?}")]
    NoExtension(PathBuf),
}

/// A polygon feature with the requested attribute values, in request order.
/// Null attributes are `None`.
struct Feature {
    attributes: Vec<Option<String>>,
    geometry: MultiPolygon<f64>,
}

pub fn load_layers(config: &AppConfig) -> Result<Layers> {
    info!("Loading boundary layers...");
    let target = &config.input.target_crs;

    let boundary = load_municipalities(&config.input.municipalities, &config.filter)?;
    let boundary = select_municipality(boundary, &config.filter.municipality_name)?;
    let to_target = Reprojector::new(&config.input.municipalities_crs, target)?;
    let boundary = boundary
        .into_iter()
        .map(|Municipality { name, geometry }| {
            Ok(Municipality { name, geometry: to_target.apply(geometry)? })
        })
        .collect::<Result<Vec<_>>>()?;
    info!("Municipality '{}': {} feature(s) ({})",
        config.filter.municipality_name, boundary.len(), to_target.describe());

    let to_target = Reprojector::new(&config.input.zoning_crs, target)?;
    let zoning = load_zoning(&config.input.zoning, &config.filter)?
        .into_iter()
        .map(|ZoningArea { municipality, category, geometry }| {
            Ok(ZoningArea { municipality, category, geometry: to_target.apply(geometry)? })
        })
        .collect::<Result<Vec<_>>>()?;
    let zoning = select_conditioned(zoning, &config.filter)?;
    info!("Conditioned zoning: {} polygon(s) ({})", zoning.len(), to_target.describe());

    Ok(Layers { boundary, zoning })
}

pub fn load_municipalities(path: &Path, filter: &FilterConfig) -> Result<Vec<Municipality>> {
    let features = read_features(path, &[filter.municipality_field.as_str()])?;
    Ok(features
        .into_iter()
        .filter_map(|f| {
            let name = f.attributes.into_iter().next().flatten()?;
            Some(Municipality { name, geometry: f.geometry })
        })
        .collect())
}

pub fn load_zoning(path: &Path, filter: &FilterConfig) -> Result<Vec<ZoningArea>> {
    let fields = [
        filter.zoning_municipality_field.as_str(),
        filter.zoning_category_field.as_str(),
    ];
    let features = read_features(path, &fields)?;
    Ok(features
        .into_iter()
        .filter_map(|f| {
            let mut attributes = f.attributes.into_iter();
            let municipality = attributes.next().flatten()?;
            let category = attributes.next().flatten()?;
            Some(ZoningArea { municipality, category, geometry: f.geometry })
        })
        .collect())
}

pub fn select_municipality(all: Vec<Municipality>, name: &str) -> Result<Vec<Municipality>, LoadError> {
    let selected: Vec<Municipality> = all.into_iter().filter(|m| m.name == name).collect();
    if selected.is_empty() {
        return Err(LoadError::EmptyFilter {
            layer: "municipality",
            filter: format!("name == '{}'", name),
        });
    }
    Ok(selected)
}

pub fn select_conditioned(all: Vec<ZoningArea>, filter: &FilterConfig) -> Result<Vec<ZoningArea>, LoadError> {
    let selected: Vec<ZoningArea> = all
        .into_iter()
        .filter(|z| z.municipality == filter.zoning_municipality_name)
        .filter(|z| z.category == filter.zoning_category)
        .collect();
    if selected.is_empty() {
        return Err(LoadError::EmptyFilter {
            layer: "zoning polygon",
            filter: format!(
                "{} == '{}' and {} == '{}'",
                filter.zoning_municipality_field,
                filter.zoning_municipality_name,
                filter.zoning_category_field,
                filter.zoning_category
            ),
        });
    }
    Ok(selected)
}

fn read_features(path: &Path, fields: &[&str]) -> Result<Vec<Feature>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| LoadError::NoExtension(path.to_path_buf()))?;

    let features = match extension.as_str() {
        "shp" => read_shapefile(path, fields)?,
        "json" | "geojson" => read_geojson(path, fields)?,
        _ => return Err(LoadError::UnsupportedFormat(extension).into()),
    };

    debug!("Read {} polygon feature(s) from {:?}", features.len(), path);
    Ok(features)
}

fn field_to_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Memo(s) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn read_shapefile(path: &Path, fields: &[&str]) -> Result<Vec<Feature>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let attributes = fields
            .iter()
            .map(|field| {
                record
                    .get(field)
                    .map(field_to_string)
                    .ok_or_else(|| LoadError::MissingField {
                        field: field.to_string(),
                        path: path.to_path_buf(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        features.push(Feature { attributes, geometry });
    }

    Ok(features)
}

fn read_geojson(path: &Path, fields: &[&str]) -> Result<Vec<Feature>> {
    use geojson::GeoJson;

    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection: {:?}", path)),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        let attributes = fields
            .iter()
            .map(|field| {
                let value = feature
                    .properties
                    .as_ref()
                    .and_then(|props| props.get(*field))
                    .ok_or_else(|| LoadError::MissingField {
                        field: field.to_string(),
                        path: path.to_path_buf(),
                    })?;
                Ok(match value {
                    serde_json::Value::String(s) => Some(s.trim().to_string()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        let geometry = match feature.geometry {
            Some(geom) => {
                let geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        features.push(Feature { attributes, geometry });
    }

    Ok(features)
}
