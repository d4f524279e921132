use crate::config::AppConfig;
use crate::data;
use crate::processing::{Synthesis, Synthesizer};
use crate::render::{self, RenderStats};
use crate::types::Layers;
use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub zoning_polygons: usize,
    pub selected_polygons: usize,
    pub requested_points: usize,
    pub placed_points: usize,
    /// (crop name, placed count) in configured order.
    pub crop_counts: Vec<(String, usize)>,
    pub render: RenderStats,
    pub output: PathBuf,
}

/// Synthesizes crop points for already loaded layers with a generator seeded
/// from `config.sampling.seed`.
pub fn synthesize(config: &AppConfig, layers: &Layers) -> Result<Synthesis> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.sampling.seed);
    let polygons: Vec<_> = layers.zoning.iter().map(|z| z.geometry.clone()).collect();
    Ok(Synthesizer::new(&config.sampling)?.synthesize(&mut rng, &polygons))
}

/// Load, synthesize, render.
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    config.validate()?;

    let layers = data::load_layers(config)?;
    let synthesis = synthesize(config, &layers)?;

    let crops = &config.sampling.crops;
    let crop_counts = crops
        .iter()
        .map(|c| c.name.clone())
        .zip(synthesis.crop_counts(crops.len()))
        .collect::<Vec<_>>();
    for (name, count) in &crop_counts {
        info!("  {}: {} point(s)", name, count);
    }

    let stats = render::render_map(&config.render, crops, &layers, &synthesis.points)?;

    Ok(RunSummary {
        zoning_polygons: layers.zoning.len(),
        selected_polygons: synthesis.selected.len(),
        requested_points: synthesis.requested,
        placed_points: synthesis.points.len(),
        crop_counts,
        render: stats,
        output: config.render.output.clone(),
    })
}
