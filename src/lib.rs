pub mod cartography;
pub mod clip;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod processing;
pub mod projection;
pub mod render;
pub mod text;
pub mod types;
