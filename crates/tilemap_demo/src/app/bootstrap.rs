use std::path::PathBuf;

use tilemap_core::{
    Camera2D, ClippingConfig, HeadlessScene, Tilemap, TilemapSettings, Vec2,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::{loader, DemoError};

const MAP_ENV_VAR: &str = "TILEMAP_DEMO_MAP";
const MIN_CLIP_SCALE_ENV_VAR: &str = "TILEMAP_MIN_CLIP_SCALE";
const TILE_BUFFER_ENV_VAR: &str = "TILEMAP_TILE_BUFFER";
const FRAMES_ENV_VAR: &str = "TILEMAP_DEMO_FRAMES";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DemoConfig {
    pub(crate) map_path: Option<PathBuf>,
    pub(crate) clipping: ClippingConfig,
    pub(crate) frames: u32,
    pub(crate) viewport: (u32, u32),
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            map_path: None,
            clipping: ClippingConfig::default(),
            frames: 240,
            viewport: (640, 360),
        }
    }
}

impl DemoConfig {
    pub(crate) fn from_env() -> Result<Self, DemoError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, DemoError> {
        let mut config = Self::default();
        if let Some(path) = lookup(MAP_ENV_VAR).filter(|raw| !raw.trim().is_empty()) {
            config.map_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(raw) = lookup(MIN_CLIP_SCALE_ENV_VAR) {
            config.clipping.min_tile_clipping_scale = parse_positive(MIN_CLIP_SCALE_ENV_VAR, &raw)?;
        }
        if let Some(raw) = lookup(TILE_BUFFER_ENV_VAR) {
            config.clipping.tile_buffer_size = parse_non_negative(TILE_BUFFER_ENV_VAR, &raw)?;
        }
        if let Some(raw) = lookup(FRAMES_ENV_VAR) {
            config.frames = raw.trim().parse().map_err(|_| DemoError::InvalidEnv {
                var: FRAMES_ENV_VAR,
                value: raw.clone(),
                reason: "expected a frame count",
            })?;
        }
        Ok(config)
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<f32, DemoError> {
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(DemoError::InvalidEnv {
            var,
            value: raw.to_string(),
            reason: "expected a positive number",
        }),
    }
}

fn parse_non_negative(var: &'static str, raw: &str) -> Result<f32, DemoError> {
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(DemoError::InvalidEnv {
            var,
            value: raw.to_string(),
            reason: "expected a non-negative number",
        }),
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: DemoConfig,
    pub(crate) map: Tilemap<HeadlessScene>,
}

pub(crate) fn build_app() -> Result<AppWiring, DemoError> {
    init_tracing();
    info!("=== Tilemap Demo Startup ===");

    let config = DemoConfig::from_env()?;
    wire(config)
}

fn wire(config: DemoConfig) -> Result<AppWiring, DemoError> {
    let description = match &config.map_path {
        Some(path) => loader::load_description(path)?,
        None => loader::builtin_description(),
    };
    let scene = HeadlessScene::with_view(config.viewport, Camera2D::default());
    let settings = TilemapSettings {
        alignment: Vec2::new(0.5, 0.5),
        clipping: config.clipping,
        ..TilemapSettings::default()
    };
    let map = Tilemap::from_description(description, settings, scene)?;
    info!(
        layers = map.layer_count(),
        width = map.map_size().width,
        height = map.map_size().height,
        frames = config.frames,
        "demo_wired"
    );
    Ok(AppWiring { config, map })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
