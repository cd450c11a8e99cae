use tracing::warn;

use super::{NodeHandle, SceneHost};
use crate::geometry::{Rect, Vec2};
use crate::map::{AnimationFrame, TileFlip, TileRegion};

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
const CAMERA_ZOOM_MIN: f32 = 0.05;
const CAMERA_ZOOM_MAX: f32 = 16.0;

/// Camera convention:
/// - `position` is the world point shown at the viewport center.
/// - screen space has y growing downward, world space y growing upward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: CAMERA_ZOOM_DEFAULT,
        }
    }
}

impl Camera2D {
    pub fn effective_zoom(&self) -> f32 {
        if !self.zoom.is_finite() {
            return CAMERA_ZOOM_DEFAULT;
        }
        self.zoom.clamp(CAMERA_ZOOM_MIN, CAMERA_ZOOM_MAX)
    }

    pub fn world_to_screen(&self, world: Vec2, viewport: (u32, u32)) -> Vec2 {
        let zoom = self.effective_zoom();
        Vec2::new(
            (world.x - self.position.x) * zoom + viewport.0 as f32 * 0.5,
            viewport.1 as f32 * 0.5 - (world.y - self.position.y) * zoom,
        )
    }

    pub fn screen_to_world(&self, screen: Vec2, viewport: (u32, u32)) -> Vec2 {
        let zoom = self.effective_zoom();
        Vec2::new(
            (screen.x - viewport.0 as f32 * 0.5) / zoom + self.position.x,
            (viewport.1 as f32 * 0.5 - screen.y) / zoom + self.position.y,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub parent: Option<NodeHandle>,
    pub position: Vec2,
    pub anchor: Vec2,
    pub visible: bool,
    pub opacity: f32,
    pub z_order: i32,
    pub region: Option<TileRegion>,
    pub flip: TileFlip,
    pub animation: Option<Vec<AnimationFrame>>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            parent: None,
            position: Vec2::ZERO,
            anchor: Vec2::ZERO,
            visible: true,
            opacity: 1.0,
            z_order: 0,
            region: None,
            flip: TileFlip::default(),
            animation: None,
        }
    }
}

/// Translation-only scene graph with an optional attached view.
///
/// Good enough to drive the map without a graphics runtime: nodes are plain
/// records, and screen positions are resolved through the camera. Slots of
/// despawned nodes are reused, so a stale handle may alias a newer node.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    nodes: Vec<Option<NodeState>>,
    free_slots: Vec<usize>,
    live_count: usize,
    camera: Camera2D,
    viewport: Option<(u32, u32)>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view(viewport: (u32, u32), camera: Camera2D) -> Self {
        Self {
            viewport: Some(viewport),
            camera,
            ..Self::default()
        }
    }

    pub fn attach_view(&mut self, viewport: (u32, u32)) {
        self.viewport = Some(viewport);
    }

    pub fn detach_view(&mut self) {
        self.viewport = None;
    }

    pub fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera2D {
        &mut self.camera
    }

    pub fn node(&self, node: NodeHandle) -> Option<&NodeState> {
        self.nodes.get(node.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_count(&self) -> usize {
        self.live_count
    }

    pub fn is_visible(&self, node: NodeHandle) -> bool {
        self.node(node).is_some_and(|state| state.visible)
    }

    pub fn children(&self, parent: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, state)| {
                let state = state.as_ref()?;
                (state.parent == Some(parent)).then_some(NodeHandle(index as u64))
            })
            .collect()
    }

    /// Position of `node`'s local origin in world space.
    pub fn world_position(&self, node: NodeHandle) -> Vec2 {
        let mut position = Vec2::ZERO;
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let Some(state) = self.node(current) else {
                break;
            };
            position += state.position;
            cursor = state.parent;
        }
        position
    }

    fn node_mut(&mut self, node: NodeHandle, operation: &'static str) -> Option<&mut NodeState> {
        let state = self
            .nodes
            .get_mut(node.0 as usize)
            .and_then(Option::as_mut);
        if state.is_none() {
            warn!(node = node.0, operation, "headless scene node missing");
        }
        state
    }
}

impl SceneHost for HeadlessScene {
    fn spawn_node(&mut self, parent: Option<NodeHandle>) -> NodeHandle {
        let state = Some(NodeState {
            parent,
            ..NodeState::default()
        });
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.nodes[index] = state;
                index
            }
            None => {
                self.nodes.push(state);
                self.nodes.len() - 1
            }
        };
        self.live_count += 1;
        NodeHandle(index as u64)
    }

    fn despawn_node(&mut self, node: NodeHandle) {
        let Some(slot) = self.nodes.get_mut(node.0 as usize) else {
            return;
        };
        if slot.take().is_none() {
            return;
        }
        self.free_slots.push(node.0 as usize);
        self.live_count -= 1;
        let orphans: Vec<NodeHandle> = self.children(node);
        for child in orphans {
            self.despawn_node(child);
        }
    }

    fn set_visible(&mut self, node: NodeHandle, visible: bool) {
        if let Some(state) = self.node_mut(node, "set_visible") {
            state.visible = visible;
        }
    }

    fn set_position(&mut self, node: NodeHandle, position: Vec2) {
        if let Some(state) = self.node_mut(node, "set_position") {
            state.position = position;
        }
    }

    fn set_anchor(&mut self, node: NodeHandle, anchor: Vec2) {
        if let Some(state) = self.node_mut(node, "set_anchor") {
            state.anchor = anchor;
        }
    }

    fn set_opacity(&mut self, node: NodeHandle, opacity: f32) {
        if let Some(state) = self.node_mut(node, "set_opacity") {
            state.opacity = opacity;
        }
    }

    fn set_z_order(&mut self, node: NodeHandle, z_order: i32) {
        if let Some(state) = self.node_mut(node, "set_z_order") {
            state.z_order = z_order;
        }
    }

    fn set_tile_visual(&mut self, node: NodeHandle, region: TileRegion, flip: TileFlip) {
        if let Some(state) = self.node_mut(node, "set_tile_visual") {
            state.region = Some(region);
            state.flip = flip;
        }
    }

    fn convert_point_to_node(&self, point: Vec2, node: NodeHandle) -> Vec2 {
        let viewport = self.viewport.unwrap_or((0, 0));
        self.camera.screen_to_world(point, viewport) - self.world_position(node)
    }

    fn view_bounds(&self) -> Option<Rect> {
        self.viewport
            .map(|(width, height)| Rect::from_origin_size(0.0, 0.0, width as f32, height as f32))
    }

    fn play_animation(&mut self, node: NodeHandle, frames: &[AnimationFrame]) {
        if let Some(state) = self.node_mut(node, "play_animation") {
            state.animation = Some(frames.to_vec());
        }
    }
}
