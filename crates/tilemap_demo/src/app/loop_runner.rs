use std::f32::consts::TAU;
use std::process::ExitCode;

use serde::Serialize;
use tilemap_core::{ClipState, HeadlessScene, Tilemap, Vec2};
use tracing::{debug, error, info};

use super::bootstrap::AppWiring;

/// Frames per full zoom oscillation.
const ZOOM_PERIOD_FRAMES: f32 = 120.0;
const ZOOM_CENTER: f32 = 0.7;
const ZOOM_AMPLITUDE: f32 = 0.35;
/// Fraction of the map's half extent covered by the camera pan.
const PAN_REACH: f32 = 0.6;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct RunSummary {
    pub(crate) frames: u32,
    pub(crate) clip_passes: u32,
    pub(crate) skipped_passes: u32,
    pub(crate) suspended_frames: u32,
    pub(crate) max_visible: usize,
    pub(crate) min_visible: Option<usize>,
    pub(crate) total_tiles: usize,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { config, mut map } = app;
    if let Err(err) = map.enable_tile_clipping() {
        error!(error = %err, "clipping_unavailable");
        return ExitCode::FAILURE;
    }

    let summary = simulate(&mut map, config.frames);
    match serde_json::to_string(&summary) {
        Ok(json) => info!(summary = %json, "demo_finished"),
        Err(err) => error!(error = %err, "summary_encode_failed"),
    }
    ExitCode::SUCCESS
}

/// Pans and zooms the camera over the map, running one clipping pass per
/// frame with the camera zoom as the scale.
pub(crate) fn simulate(map: &mut Tilemap<HeadlessScene>, frames: u32) -> RunSummary {
    let reach = map.geometry().projected_size() * (0.5 * PAN_REACH);
    let mut summary = RunSummary {
        total_tiles: map.layers().iter().map(|layer| layer.tile_count()).sum(),
        ..RunSummary::default()
    };

    for frame in 0..frames {
        let phase = frame as f32 / ZOOM_PERIOD_FRAMES * TAU;
        let zoom = ZOOM_CENTER + ZOOM_AMPLITUDE * phase.cos();
        {
            let camera = map.scene_mut().camera_mut();
            camera.position = Vec2::new(reach.x * (phase * 0.5).sin(), reach.y * (phase * 0.25).sin());
            camera.zoom = zoom;
        }
        let scale = map.scene().camera().effective_zoom();
        let reports = map.clip_tiles(scale);

        summary.frames += 1;
        if map.clip_state() == ClipState::AutoSuspended {
            summary.suspended_frames += 1;
        }
        if reports.is_empty() {
            continue;
        }

        summary.clip_passes += 1;
        let visible: usize = reports.values().map(|report| report.visible).sum();
        if reports.values().all(|report| report.skipped) {
            summary.skipped_passes += 1;
        }
        summary.max_visible = summary.max_visible.max(visible);
        summary.min_visible = Some(summary.min_visible.map_or(visible, |min| min.min(visible)));
        debug!(frame, scale, visible, state = ?map.clip_state(), "frame_clipped");
    }
    summary
}
