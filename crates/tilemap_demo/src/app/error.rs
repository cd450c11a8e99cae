use std::path::PathBuf;

use thiserror::Error;
use tilemap_core::TilemapError;

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error("failed to read map description {path}: {source}")]
    ReadMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse map description {origin}{}: {message}", at_location(.location))]
    ParseMap {
        origin: String,
        location: String,
        message: String,
    },
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Tilemap(#[from] TilemapError),
}

fn at_location(location: &str) -> String {
    if location.is_empty() || location == "." {
        String::new()
    } else {
        format!(" at {location}")
    }
}
