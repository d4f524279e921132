use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Attribute schema of the source datasets.
pub const MUNICIPALITY_NAME_FIELD: &str = "MPIO_CNMBR";
pub const MUNICIPALITY_NAME: &str = "IPIALES";
pub const ZONING_MUNICIPALITY_FIELD: &str = "municipio";
pub const ZONING_MUNICIPALITY_NAME: &str = "Ipiales";
pub const ZONING_CATEGORY_FIELD: &str = "tipo_front";
pub const CONDITIONED_CATEGORY: &str = "Condicionada";

pub const MUNICIPALITIES_PATH: &str = "data/Narino/Municipios_Nariño.shp";
pub const ZONING_PATH: &str = "data/Frontera_Agricola/Frontera_Agr_Cond_NCon_Abr2024.shp";
pub const OUTPUT_PATH: &str = "data/Ipiales/mapa_cultivos_zona_norte_recortado.png";

/// Geographic MAGNA-SIRGAS, the CRS both source layers are published in.
pub const SOURCE_CRS: &str = "EPSG:4686";
/// MAGNA-SIRGAS / Colombia Bogota zone, planar meters.
pub const TARGET_CRS: &str = "EPSG:3116";

pub const SEED: u64 = 42;
pub const POLYGON_FRACTION: f64 = 0.7;
pub const MIN_POINTS_PER_POLYGON: u32 = 8;
pub const MAX_POINTS_PER_POLYGON: u32 = 20;
pub const MAX_ATTEMPTS: u32 = 100;
pub const MIN_SPACING: f64 = 200.0;
pub const SPACING_WINDOW: usize = 10;

pub const WINDOW: Window = Window {
    xmin: 580_000.0,
    xmax: 620_000.0,
    ymin: 560_000.0,
    ymax: 600_000.0,
};
pub const TICK_INTERVAL: f64 = 10_000.0;
pub const TICK_MODULUS: f64 = 100_000.0;
/// Upper bound on grid lines / ticks per axis.
pub const MAX_TICKS: usize = 1000;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub filter: FilterConfig,
    pub sampling: SamplingConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub municipalities: PathBuf,
    pub zoning: PathBuf,
    pub municipalities_crs: String,
    pub zoning_crs: String,
    pub target_crs: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            municipalities: PathBuf::from(MUNICIPALITIES_PATH),
            zoning: PathBuf::from(ZONING_PATH),
            municipalities_crs: SOURCE_CRS.to_string(),
            zoning_crs: SOURCE_CRS.to_string(),
            target_crs: TARGET_CRS.to_string(),
        }
    }
}

/// Which attribute columns to read and which values to keep.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub municipality_field: String,
    pub municipality_name: String,
    pub zoning_municipality_field: String,
    pub zoning_municipality_name: String,
    pub zoning_category_field: String,
    pub zoning_category: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            municipality_field: MUNICIPALITY_NAME_FIELD.to_string(),
            municipality_name: MUNICIPALITY_NAME.to_string(),
            zoning_municipality_field: ZONING_MUNICIPALITY_FIELD.to_string(),
            zoning_municipality_name: ZONING_MUNICIPALITY_NAME.to_string(),
            zoning_category_field: ZONING_CATEGORY_FIELD.to_string(),
            zoning_category: CONDITIONED_CATEGORY.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    pub seed: u64,
    pub polygon_fraction: f64,
    pub min_points: u32,
    /// Exclusive upper bound.
    pub max_points: u32,
    pub max_attempts: u32,
    pub min_spacing: f64,
    pub spacing_window: usize,
    pub crops: Vec<CropConfig>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            seed: SEED,
            polygon_fraction: POLYGON_FRACTION,
            min_points: MIN_POINTS_PER_POLYGON,
            max_points: MAX_POINTS_PER_POLYGON,
            max_attempts: MAX_ATTEMPTS,
            min_spacing: MIN_SPACING,
            spacing_window: SPACING_WINDOW,
            crops: default_crops(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CropConfig {
    pub name: String,
    pub probability: f64,
    pub color: String, // Hex code
    pub marker: Marker,
    /// Marker area in pt².
    pub size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Circle,
    Square,
    TriangleUp,
    TriangleDown,
}

fn crop(name: &str, probability: f64, color: &str, marker: Marker, size: f32) -> CropConfig {
    CropConfig {
        name: name.to_string(),
        probability,
        color: color.to_string(),
        marker,
        size,
    }
}

pub fn default_crops() -> Vec<CropConfig> {
    vec![
        crop("Papa", 0.60, "#1f77b4", Marker::Circle, 80.0),
        crop("Arveja", 0.30, "#ff7f0e", Marker::Square, 60.0),
        crop("Maíz", 0.07, "#2ca02c", Marker::TriangleUp, 40.0),
        crop("Cebolla", 0.03, "#d62728", Marker::TriangleDown, 40.0),
    ]
}

/// Axis-aligned clip window in target CRS units.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Window {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Window {
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    pub output: PathBuf,
    pub width_in: f32,
    pub height_in: f32,
    pub dpi: f32,
    pub background: String,
    pub tick_interval: f64,
    pub tick_modulus: f64,
    pub x_label: String,
    pub y_label: String,
    pub window: Window,
    pub boundary: BoundaryStyle,
    pub zoning: ZoningStyle,
    pub legend: LegendConfig,
    pub scale_bar: ScaleBarConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(OUTPUT_PATH),
            width_in: 15.0,
            height_in: 10.0,
            dpi: 300.0,
            background: "#ffffff".to_string(),
            tick_interval: TICK_INTERVAL,
            tick_modulus: TICK_MODULUS,
            x_label: "Longitud (Este-Oeste)".to_string(),
            y_label: "Latitud (Norte-Sur)".to_string(),
            window: WINDOW,
            boundary: BoundaryStyle::default(),
            zoning: ZoningStyle::default(),
            legend: LegendConfig::default(),
            scale_bar: ScaleBarConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BoundaryStyle {
    pub label: String,
    pub color: String,
    /// Line width in pt.
    pub line_width: f32,
}

impl Default for BoundaryStyle {
    fn default() -> Self {
        Self {
            label: "Límite Municipal".to_string(),
            color: "#000000".to_string(),
            line_width: 0.8,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ZoningStyle {
    pub label: String,
    pub fill: String,
    pub alpha: f32,
    pub edge: String,
    pub line_width: f32,
}

impl Default for ZoningStyle {
    fn default() -> Self {
        Self {
            label: "Zona Condicionada".to_string(),
            fill: "#4daf4a".to_string(),
            alpha: 0.3,
            edge: "#ffffff".to_string(),
            line_width: 0.3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LegendConfig {
    pub title: String,
    pub font_size: f32,
    pub title_font_size: f32,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self {
            title: "Distribución de Cultivos".to_string(),
            font_size: 11.0,
            title_font_size: 12.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ScaleBarConfig {
    /// Bar length in target CRS units.
    pub length: f64,
    /// Bar thickness in target CRS units.
    pub thickness: f64,
    pub label: String,
}

impl Default for ScaleBarConfig {
    fn default() -> Self {
        Self {
            length: 2_000.0,
            thickness: 50.0,
            label: "2 km".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        let sampling = &self.sampling;
        if sampling.crops.is_empty() {
            bail!("At least one crop must be configured");
        }
        if let Some(bad) = sampling.crops.iter().find(|c| !(c.probability >= 0.0)) {
            bail!("Crop '{}' has invalid probability {}", bad.name, bad.probability);
        }
        let total: f64 = sampling.crops.iter().map(|c| c.probability).sum();
        if (total - 1.0).abs() > 1e-6 {
            bail!("Crop probabilities must sum to 1, got {}", total);
        }
        if !(0.0..=1.0).contains(&sampling.polygon_fraction) {
            bail!("polygon_fraction must be within [0, 1], got {}", sampling.polygon_fraction);
        }
        if sampling.min_points >= sampling.max_points {
            bail!(
                "min_points ({}) must be lower than max_points ({})",
                sampling.min_points,
                sampling.max_points
            );
        }

        let render = &self.render;
        let window = render.window;
        if !(window.width() > 0.0 && window.height() > 0.0) {
            return Err(anyhow!("Render window is empty: {:?}", window));
        }
        if !(render.dpi > 0.0 && render.width_in > 0.0 && render.height_in > 0.0) {
            bail!("Figure size and dpi must be positive");
        }
        if !(render.tick_interval > 0.0 && render.tick_modulus > 0.0) {
            bail!("tick_interval and tick_modulus must be positive");
        }
        let ticks = window.width().max(window.height()) / render.tick_interval;
        if ticks > MAX_TICKS as f64 {
            bail!(
                "tick_interval {} gives {:.0} ticks per axis, at most {} allowed",
                render.tick_interval,
                ticks,
                MAX_TICKS
            );
        }
        Ok(())
    }
}
