mod headless;

use crate::geometry::{Rect, TileCoord, Vec2};
use crate::map::{AnimationFrame, Tile, TileFlip, TileRegion};

pub use headless::{Camera2D, HeadlessScene, NodeState, CAMERA_ZOOM_DEFAULT};

/// Opaque handle to a renderable node owned by the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

/// Scene-graph capability the map drives. The map never renders anything
/// itself; it only creates nodes, parents them and updates their state.
pub trait SceneHost {
    fn spawn_node(&mut self, parent: Option<NodeHandle>) -> NodeHandle;
    fn despawn_node(&mut self, node: NodeHandle);
    fn set_visible(&mut self, node: NodeHandle, visible: bool);
    fn set_position(&mut self, node: NodeHandle, position: Vec2);
    fn set_anchor(&mut self, node: NodeHandle, anchor: Vec2);
    fn set_opacity(&mut self, node: NodeHandle, opacity: f32);
    fn set_z_order(&mut self, node: NodeHandle, z_order: i32);
    fn set_tile_visual(&mut self, node: NodeHandle, region: TileRegion, flip: TileFlip);

    /// Converts a screen/view position into `node`'s local coordinate space.
    fn convert_point_to_node(&self, point: Vec2, node: NodeHandle) -> Vec2;

    /// Screen-space bounds of the attached view, if one is attached.
    fn view_bounds(&self) -> Option<Rect>;

    fn play_animation(&mut self, _node: NodeHandle, _frames: &[AnimationFrame]) {}
}

/// Hook for collaborators that mirror the tile grid, such as a
/// pathfinding graph.
pub trait TileListener {
    fn tile_placed(&mut self, _layer: &str, _tile: &Tile) {}
    fn tile_removed(&mut self, _layer: &str, _coord: TileCoord) {}
}
