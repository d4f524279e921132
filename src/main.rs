use anyhow::Context;
use clap::{Parser, Subcommand};
use frontier_map::config::AppConfig;
use frontier_map::pipeline;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the crop distribution map
    Generate {
        /// TOML configuration; built-in defaults when omitted
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the sampling seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override the output image path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Write the default configuration as TOML
    InitConfig {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { config, seed, output } => {
            let mut app_config = match &config {
                Some(path) => {
                    info!("Generating map with config: {:?}", path);
                    AppConfig::load_from_file(path)?
                }
                None => {
                    info!("Generating map with built-in configuration");
                    AppConfig::default()
                }
            };
            if let Some(seed) = seed {
                app_config.sampling.seed = seed;
            }
            if let Some(output) = output {
                app_config.render.output = output;
            }

            let summary = pipeline::run(&app_config)?;

            info!(
                "Placed {} of {} requested points in {} of {} conditioned polygons",
                summary.placed_points,
                summary.requested_points,
                summary.selected_polygons,
                summary.zoning_polygons
            );
            info!("Generation complete: {:?}", summary.output);
        }
        Commands::InitConfig { output } => {
            let text = AppConfig::default().to_toml()?;
            fs::write(&output, text)
                .with_context(|| format!("Failed to write config file: {:?}", output))?;
            info!("Wrote default configuration to {:?}", output);
        }
    }

    Ok(())
}
