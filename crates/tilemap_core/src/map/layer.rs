use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::store::{Placement, TileStore};
use super::tileset::{Gid, ResolvedTile, TileData, TileFlip, Tilesets};
use crate::geometry::{GridGeometry, MapSize, Rect, TileCoord, Vec2};
use crate::properties::Properties;
use crate::scene::{NodeHandle, SceneHost};

/// Smallest screen-space step of the clipping scan, in pixels.
const MIN_SCAN_STEP_PX: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    #[error("layer '{layer}' tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
}

/// A tile placed on a layer. Its [`TileData`] is shared with every other
/// tile of the same type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    data: Arc<TileData>,
    coord: TileCoord,
    node: NodeHandle,
    parent: NodeHandle,
    anchor: Vec2,
    tileset_offset: Vec2,
    flip: TileFlip,
    visible: bool,
}

impl Tile {
    pub fn data(&self) -> &Arc<TileData> {
        &self.data
    }

    pub fn gid(&self) -> u32 {
        self.data.gid
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Node of the owning layer.
    pub fn parent(&self) -> NodeHandle {
        self.parent
    }

    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    pub fn flip(&self) -> TileFlip {
        self.flip
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetTileOutcome {
    pub placed: Tile,
    /// Tile that occupied the cell before; already detached from the scene.
    pub removed: Option<Tile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub placed: usize,
    pub unresolved: usize,
    pub cleared: Vec<TileCoord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipReport {
    pub visible: usize,
    pub newly_shown: usize,
    pub newly_hidden: usize,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerDesc {
    pub name: String,
    pub offset: Vec2,
    pub opacity: f32,
    pub visible: bool,
    pub z_order: Option<i32>,
    pub properties: Properties,
}

impl LayerDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: Vec2::ZERO,
            opacity: 1.0,
            visible: true,
            z_order: None,
            properties: Properties::new(),
        }
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = Some(z_order);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScanSignature {
    /// Cell under the first sample, whether or not it holds a tile.
    first: TileCoord,
    /// Window origin in whole sampling steps.
    origin_steps: (i64, i64),
    width: f32,
    height: f32,
    step_x: f32,
    step_y: f32,
}

/// Coordinates shown by the clipping scan, tagged with the pass that last
/// touched them.
#[derive(Debug, Default)]
struct VisibleSet {
    active: bool,
    generation: u64,
    coords: HashMap<TileCoord, u64>,
    last_scan: Option<ScanSignature>,
}

impl VisibleSet {
    fn reset(&mut self, active: bool) {
        self.active = active;
        self.coords.clear();
        self.last_scan = None;
    }
}

#[derive(Debug)]
pub struct Layer {
    name: String,
    offset: Vec2,
    opacity: f32,
    visible: bool,
    z_order: i32,
    position: Vec2,
    node: NodeHandle,
    geometry: GridGeometry,
    tiles: TileStore<Tile>,
    clip: VisibleSet,
    properties: Properties,
}

impl Layer {
    pub(crate) fn new(
        desc: LayerDesc,
        z_order: i32,
        geometry: GridGeometry,
        scene: &mut dyn SceneHost,
        parent: Option<NodeHandle>,
    ) -> Self {
        let node = scene.spawn_node(parent);
        let opacity = clamp_opacity(desc.opacity);
        scene.set_opacity(node, opacity);
        scene.set_visible(node, desc.visible);
        scene.set_z_order(node, z_order);
        Self {
            name: desc.name,
            offset: desc.offset,
            opacity,
            visible: desc.visible,
            z_order,
            position: Vec2::ZERO,
            node,
            geometry,
            tiles: TileStore::new(geometry.map_size),
            clip: VisibleSet::default(),
            properties: desc.properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    /// Layer origin relative to the tilemap origin.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn size(&self) -> MapSize {
        self.tiles.size()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.tiles.iter().map(|(_, tile)| tile)
    }

    pub fn is_valid_coord(&self, coord: impl Into<TileCoord>) -> bool {
        self.tiles.is_valid(coord.into())
    }

    // Coordinate queries.

    /// Layer-local anchor position of a tile at `coord`.
    pub fn tile_position(&self, coord: impl Into<TileCoord>, tileset_offset: Vec2) -> Vec2 {
        self.geometry.tile_position(coord.into(), tileset_offset) + self.offset_in_layer_space()
    }

    pub fn fractional_coord_at_position(&self, position: Vec2, must_be_valid: bool) -> Option<Vec2> {
        let coord = self
            .geometry
            .fractional_coord_at(position - self.offset_in_layer_space());
        if must_be_valid && !self.tiles.is_valid(TileCoord::from_fractional(coord)) {
            return None;
        }
        Some(coord)
    }

    pub fn coord_at_position(&self, position: Vec2) -> Option<TileCoord> {
        let coord = self.coord_at_position_unchecked(position);
        self.tiles.is_valid(coord).then_some(coord)
    }

    pub fn coord_at_position_unchecked(&self, position: Vec2) -> TileCoord {
        self.geometry
            .coord_at(position - self.offset_in_layer_space())
    }

    pub fn coord_at_screen_position(&self, scene: &dyn SceneHost, screen: Vec2) -> Option<TileCoord> {
        self.coord_at_position(scene.convert_point_to_node(screen, self.node))
    }

    pub fn tile_at(&self, coord: impl Into<TileCoord>) -> Option<&Tile> {
        self.tiles.get(coord.into())
    }

    pub fn tile_at_position(&self, position: Vec2) -> Option<&Tile> {
        self.coord_at_position(position)
            .and_then(|coord| self.tiles.get(coord))
    }

    pub fn tile_at_screen_position(&self, scene: &dyn SceneHost, screen: Vec2) -> Option<&Tile> {
        self.coord_at_screen_position(scene, screen)
            .and_then(|coord| self.tiles.get(coord))
    }

    // Mutation.

    pub fn set_tile(
        &mut self,
        scene: &mut dyn SceneHost,
        coord: impl Into<TileCoord>,
        resolved: &ResolvedTile,
        flip: TileFlip,
    ) -> Option<SetTileOutcome> {
        let coord = coord.into();
        if !self.tiles.is_valid(coord) {
            return None;
        }

        let node = scene.spawn_node(Some(self.node));
        let visible = !self.clip.active || self.clip.coords.contains_key(&coord);
        scene.set_position(node, self.tile_position(coord, resolved.tileset_offset));
        scene.set_anchor(node, self.geometry.tile_anchor);
        scene.set_tile_visual(node, resolved.data.region, flip);
        scene.set_visible(node, visible);
        if let Some(frames) = resolved.data.animation.as_deref() {
            if !frames.is_empty() {
                scene.play_animation(node, frames);
            }
        }

        let tile = Tile {
            data: Arc::clone(&resolved.data),
            coord,
            node,
            parent: self.node,
            anchor: self.geometry.tile_anchor,
            tileset_offset: resolved.tileset_offset,
            flip,
            visible,
        };
        let placed = tile.clone();
        match self.tiles.set(coord, tile) {
            Placement::Rejected => {
                scene.despawn_node(node);
                None
            }
            Placement::Placed { previous } => {
                if let Some(old) = &previous {
                    scene.despawn_node(old.node);
                }
                self.clip.last_scan = None;
                Some(SetTileOutcome {
                    placed,
                    removed: previous,
                })
            }
        }
    }

    pub fn set_tile_at_position(
        &mut self,
        scene: &mut dyn SceneHost,
        position: Vec2,
        resolved: &ResolvedTile,
        flip: TileFlip,
    ) -> Option<SetTileOutcome> {
        let coord = self.coord_at_position(position)?;
        self.set_tile(scene, coord, resolved, flip)
    }

    pub fn remove_tile(
        &mut self,
        scene: &mut dyn SceneHost,
        coord: impl Into<TileCoord>,
    ) -> Option<Tile> {
        let coord = coord.into();
        let removed = self.tiles.remove(coord)?;
        scene.despawn_node(removed.node);
        self.clip.coords.remove(&coord);
        self.clip.last_scan = None;
        Some(removed)
    }

    pub fn remove_tile_at_position(
        &mut self,
        scene: &mut dyn SceneHost,
        position: Vec2,
    ) -> Option<Tile> {
        let coord = self.coord_at_position(position)?;
        self.remove_tile(scene, coord)
    }

    /// Removes every tile, returning them detached.
    pub fn clear_tiles(&mut self, scene: &mut dyn SceneHost) -> Vec<Tile> {
        let removed = self.tiles.clear();
        for tile in &removed {
            scene.despawn_node(tile.node);
        }
        self.clip.coords.clear();
        self.clip.last_scan = None;
        removed
    }

    /// Replaces the layer's contents with row-major gid data.
    ///
    /// Index `i` lands on `(i % width, i / width)`; gid 0 leaves the cell
    /// empty. A length other than `width * height` is rejected and the layer
    /// is left untouched.
    pub fn initialize_from_flat_array(
        &mut self,
        scene: &mut dyn SceneHost,
        tilesets: &Tilesets,
        data: &[u32],
    ) -> Result<LoadReport, LayerError> {
        let size = self.tiles.size();
        let expected = size.cell_count();
        if data.len() != expected {
            warn!(
                layer = %self.name,
                expected,
                actual = data.len(),
                "rejected layer data with wrong length"
            );
            return Err(LayerError::TileCountMismatch {
                layer: self.name.clone(),
                expected,
                actual: data.len(),
            });
        }

        let cleared = self
            .clear_tiles(scene)
            .into_iter()
            .map(|tile| tile.coord)
            .collect();
        let mut report = LoadReport {
            cleared,
            ..LoadReport::default()
        };
        let mut resolved_by_gid: HashMap<u32, Option<ResolvedTile>> = HashMap::new();
        let width = size.width as usize;
        for (index, raw) in data.iter().enumerate() {
            let gid = Gid(*raw);
            if gid.is_empty() {
                continue;
            }
            let resolved = resolved_by_gid
                .entry(gid.id())
                .or_insert_with(|| tilesets.resolve(gid));
            let Some(resolved) = resolved.as_ref() else {
                report.unresolved += 1;
                continue;
            };
            let coord = TileCoord::new((index % width) as i32, (index / width) as i32);
            if self.set_tile(scene, coord, resolved, gid.flip()).is_some() {
                report.placed += 1;
            }
        }

        if report.unresolved > 0 {
            warn!(
                layer = %self.name,
                unresolved = report.unresolved,
                "layer data references gids no tileset provides"
            );
        }
        debug!(layer = %self.name, placed = report.placed, "layer data loaded");
        Ok(report)
    }

    /// Fills every cell with the same gid.
    pub fn initialize_uniform(
        &mut self,
        scene: &mut dyn SceneHost,
        tilesets: &Tilesets,
        gid: Gid,
    ) -> LoadReport {
        let cleared = self
            .clear_tiles(scene)
            .into_iter()
            .map(|tile| tile.coord)
            .collect();
        let mut report = LoadReport {
            cleared,
            ..LoadReport::default()
        };
        if gid.is_empty() {
            return report;
        }
        let Some(resolved) = tilesets.resolve(gid) else {
            report.unresolved = self.tiles.size().cell_count();
            warn!(layer = %self.name, gid = gid.id(), "uniform fill gid has no tileset");
            return report;
        };

        let size = self.tiles.size();
        for y in 0..size.height as i32 {
            for x in 0..size.width as i32 {
                if self
                    .set_tile(scene, TileCoord::new(x, y), &resolved, gid.flip())
                    .is_some()
                {
                    report.placed += 1;
                }
            }
        }
        debug!(layer = %self.name, placed = report.placed, "layer filled");
        report
    }

    // Metadata.

    pub fn set_visible(&mut self, scene: &mut dyn SceneHost, visible: bool) {
        self.visible = visible;
        scene.set_visible(self.node, visible);
    }

    pub fn set_opacity(&mut self, scene: &mut dyn SceneHost, opacity: f32) {
        self.opacity = clamp_opacity(opacity);
        scene.set_opacity(self.node, self.opacity);
    }

    pub fn set_z_order(&mut self, scene: &mut dyn SceneHost, z_order: i32) {
        self.z_order = z_order;
        scene.set_z_order(self.node, z_order);
    }

    /// Moves the layer's tiles by a new pixel offset (y grows downward, as
    /// in the map editor).
    pub fn set_offset(&mut self, scene: &mut dyn SceneHost, offset: Vec2) {
        self.offset = offset;
        for (coord, tile) in self.tiles.iter() {
            scene.set_position(tile.node, self.tile_position(coord, tile.tileset_offset));
        }
        self.clip.last_scan = None;
    }

    pub(crate) fn set_position(&mut self, scene: &mut dyn SceneHost, position: Vec2) {
        self.position = position;
        scene.set_position(self.node, position);
        self.clip.last_scan = None;
    }

    // Clipping.

    pub fn is_clipping(&self) -> bool {
        self.clip.active
    }

    pub fn visible_tile_count(&self) -> usize {
        if self.clip.active {
            self.clip.coords.len()
        } else {
            self.tiles.len()
        }
    }

    /// Hides every tile and starts tracking visibility through clipping passes.
    pub fn hide_all_tiles(&mut self, scene: &mut dyn SceneHost) {
        self.set_all_tiles_visible(scene, false);
        self.clip.reset(true);
    }

    /// Shows every tile and stops clipping.
    pub fn show_all_tiles(&mut self, scene: &mut dyn SceneHost) {
        self.set_all_tiles_visible(scene, true);
        self.clip.reset(false);
    }

    fn set_all_tiles_visible(&mut self, scene: &mut dyn SceneHost, visible: bool) {
        for (_, tile) in self.tiles.iter_mut() {
            tile.visible = visible;
            scene.set_visible(tile.node, visible);
        }
    }

    /// Shows the tiles under a screen-space window and hides the ones shown
    /// by the previous pass that the window no longer touches.
    ///
    /// The window is `bounds` grown by `tile_buffer_size` tiles (at the
    /// current `scale`) on each edge, sampled every half tile. A pass whose
    /// first sampled cell, origin step and window shape match the previous
    /// pass is skipped.
    pub fn clip_tiles_out_of_bounds(
        &mut self,
        scene: &mut dyn SceneHost,
        bounds: Rect,
        scale: f32,
        tile_buffer_size: f32,
    ) -> ClipReport {
        if !scale.is_finite() || scale <= 0.0 {
            warn!(layer = %self.name, scale, "ignored clipping pass with invalid scale");
            return ClipReport {
                visible: self.visible_tile_count(),
                ..ClipReport::default()
            };
        }
        if !self.clip.active {
            self.hide_all_tiles(scene);
        }

        let tile_size = self.geometry.tile_size;
        let buffer = tile_buffer_size.max(0.0) * scale;
        let window = bounds.expanded(tile_size.width * buffer, tile_size.height * buffer);
        let step_x = (tile_size.width * 0.5 * scale).max(MIN_SCAN_STEP_PX);
        let step_y = (tile_size.height * 0.5 * scale).max(MIN_SCAN_STEP_PX);
        let columns = (window.width() / step_x).floor() as usize;
        let rows = (window.height() / step_y).floor() as usize;

        let first_local = scene.convert_point_to_node(window.min(), self.node);
        let signature = ScanSignature {
            first: self.coord_at_position_unchecked(first_local),
            origin_steps: (
                (window.min_x / step_x).floor() as i64,
                (window.min_y / step_y).floor() as i64,
            ),
            width: window.width(),
            height: window.height(),
            step_x,
            step_y,
        };
        if self.clip.last_scan == Some(signature) {
            return ClipReport {
                visible: self.clip.coords.len(),
                skipped: true,
                ..ClipReport::default()
            };
        }
        self.clip.last_scan = Some(signature);

        let generation = self.clip.generation + 1;
        let mut report = ClipReport::default();

        for column in 0..=columns {
            let x = window.min_x + column as f32 * step_x;
            for row in 0..=rows {
                let y = window.min_y + row as f32 * step_y;
                let local = scene.convert_point_to_node(Vec2::new(x, y), self.node);
                let Some(coord) = self.coord_at_position(local) else {
                    continue;
                };
                let Some(tile) = self.tiles.get_mut(coord) else {
                    continue;
                };
                if self.clip.coords.insert(coord, generation).is_none() {
                    tile.visible = true;
                    scene.set_visible(tile.node, true);
                    report.newly_shown += 1;
                }
            }
        }
        self.clip.generation = generation;

        let stale: Vec<TileCoord> = self
            .clip
            .coords
            .iter()
            .filter(|(_, touched)| **touched != generation)
            .map(|(coord, _)| *coord)
            .collect();
        for coord in stale {
            self.clip.coords.remove(&coord);
            if let Some(tile) = self.tiles.get_mut(coord) {
                tile.visible = false;
                scene.set_visible(tile.node, false);
                report.newly_hidden += 1;
            }
        }

        report.visible = self.clip.coords.len();
        debug!(
            layer = %self.name,
            visible = report.visible,
            shown = report.newly_shown,
            hidden = report.newly_hidden,
            "clipping pass"
        );
        report
    }

    fn offset_in_layer_space(&self) -> Vec2 {
        Vec2::new(self.offset.x, -self.offset.y)
    }
}

fn clamp_opacity(opacity: f32) -> f32 {
    if !opacity.is_finite() {
        return 1.0;
    }
    opacity.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Projection, TileSize};
    use crate::map::tileset::{AnimationFrame, AtlasLayout, Tileset};
    use crate::scene::{Camera2D, HeadlessScene};

    fn tilesets() -> Tilesets {
        let mut tilesets = Tilesets::default();
        let mut terrain = Tileset::atlas(
            "terrain",
            1,
            TileSize::new(32.0, 32.0),
            AtlasLayout {
                columns: 4,
                tile_count: 8,
                spacing: 0,
                margin: 0,
            },
        );
        terrain.annotate_tile(
            7,
            Some(vec![AnimationFrame {
                tile_id: 6,
                duration_ms: 250,
            }]),
            Properties::new(),
        );
        tilesets.insert(terrain).expect("terrain");
        tilesets
    }

    fn resolved(tilesets: &Tilesets, gid: u32) -> ResolvedTile {
        tilesets.resolve(Gid(gid)).expect("known gid")
    }

    /// Screen (sx, sy) lands on layer-local (sx, -sy).
    fn screen_aligned_scene() -> HeadlessScene {
        HeadlessScene::with_view(
            (64, 64),
            Camera2D {
                position: Vec2::new(32.0, -32.0),
                zoom: 1.0,
            },
        )
    }

    fn layer(scene: &mut HeadlessScene, projection: Projection, width: u32, height: u32) -> Layer {
        let tile_size = match projection {
            Projection::Orthogonal => TileSize::new(32.0, 32.0),
            Projection::Isometric => TileSize::new(64.0, 32.0),
        };
        let geometry = GridGeometry::new(projection, MapSize::new(width, height), tile_size);
        Layer::new(LayerDesc::new("ground"), 0, geometry, scene, None)
    }

    #[test]
    fn set_tile_places_node_at_tile_position_and_reads_back() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 4, 4);

        let outcome = layer
            .set_tile(&mut scene, (1, 2), &resolved(&tilesets, 5), TileFlip::default())
            .expect("valid coordinate");
        assert!(outcome.removed.is_none());

        let node = scene.node(outcome.placed.node()).expect("tile node");
        assert_eq!(node.position, Vec2::new(48.0, -80.0));
        assert_eq!(node.anchor, Vec2::new(0.5, 0.5));
        assert_eq!(node.parent, Some(layer.node()));
        assert_eq!(layer.coord_at_position(node.position), Some(TileCoord::new(1, 2)));
        assert_eq!(layer.tile_at((1, 2)).map(Tile::gid), Some(5));
    }

    #[test]
    fn set_on_occupied_cell_detaches_previous_tile() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 4, 4);

        let first = layer
            .set_tile(&mut scene, (0, 0), &resolved(&tilesets, 1), TileFlip::default())
            .expect("first");
        let second = layer
            .set_tile(&mut scene, (0, 0), &resolved(&tilesets, 2), TileFlip::default())
            .expect("second");

        let removed = second.removed.expect("previous tile reported");
        assert_eq!(removed.gid(), 1);
        assert_eq!(removed.node(), first.placed.node());
        assert!(scene.node(removed.node()).is_none());
        assert_eq!(second.placed.gid(), 2);
        assert_eq!(layer.tile_count(), 1);
        assert_eq!(scene.node_count(), 2);
    }

    #[test]
    fn out_of_range_operations_return_nothing() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 2, 2);
        let tile = resolved(&tilesets, 1);

        for coord in [(-1, 0), (0, -1), (2, 0), (0, 2)] {
            assert!(!layer.is_valid_coord(coord));
            assert!(layer.set_tile(&mut scene, coord, &tile, TileFlip::default()).is_none());
            assert!(layer.tile_at(coord).is_none());
            assert!(layer.remove_tile(&mut scene, coord).is_none());
        }
        assert_eq!(scene.node_count(), 1);
        assert_eq!(layer.coord_at_position(Vec2::new(-1.0, -1.0)), None);
        assert_eq!(
            layer.coord_at_position_unchecked(Vec2::new(-1.0, -1.0)),
            TileCoord::new(-1, 0)
        );
    }

    #[test]
    fn flat_array_maps_row_major_and_skips_zero() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 3, 2);

        let report = layer
            .initialize_from_flat_array(&mut scene, &tilesets, &[1, 0, 3, 0, 5, 99])
            .expect("matching length");

        assert_eq!(report.placed, 3);
        assert_eq!(report.unresolved, 1);
        assert_eq!(layer.tile_at((0, 0)).map(Tile::gid), Some(1));
        assert!(layer.tile_at((1, 0)).is_none());
        assert_eq!(layer.tile_at((2, 0)).map(Tile::gid), Some(3));
        assert!(layer.tile_at((0, 1)).is_none());
        assert_eq!(layer.tile_at((1, 1)).map(Tile::gid), Some(5));
        assert!(layer.tile_at((2, 1)).is_none());
    }

    #[test]
    fn flat_array_with_wrong_length_leaves_layer_unchanged() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 2, 2);
        layer
            .set_tile(&mut scene, (1, 1), &resolved(&tilesets, 4), TileFlip::default())
            .expect("seed tile");

        let err = layer
            .initialize_from_flat_array(&mut scene, &tilesets, &[1, 2, 3])
            .expect_err("length mismatch");
        assert_eq!(
            err,
            LayerError::TileCountMismatch {
                layer: "ground".to_string(),
                expected: 4,
                actual: 3,
            }
        );
        assert_eq!(layer.tile_count(), 1);
        assert_eq!(layer.tile_at((1, 1)).map(Tile::gid), Some(4));
    }

    #[test]
    fn uniform_fill_replaces_existing_tiles_and_keeps_flip_flags() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 3, 3);
        layer
            .set_tile(&mut scene, (2, 2), &resolved(&tilesets, 4), TileFlip::default())
            .expect("seed tile");

        let report = layer.initialize_uniform(&mut scene, &tilesets, Gid(0x8000_0002));
        assert_eq!(report.placed, 9);
        assert_eq!(report.cleared, vec![TileCoord::new(2, 2)]);
        assert!(layer.tiles().all(|tile| tile.gid() == 2 && tile.flip().horizontal));
        assert_eq!(scene.node_count(), 10);
    }

    #[test]
    fn uniform_fill_with_unknown_or_empty_gid_only_clears() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 3, 3);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));

        let report = layer.initialize_uniform(&mut scene, &tilesets, Gid(42));
        assert_eq!(report.placed, 0);
        assert_eq!(report.unresolved, 9);
        assert_eq!(report.cleared.len(), 9);
        assert_eq!(layer.tile_count(), 0);

        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));
        let report = layer.initialize_uniform(&mut scene, &tilesets, Gid::EMPTY);
        assert_eq!(report.unresolved, 0);
        assert_eq!(report.cleared.len(), 9);
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn animated_tiles_are_handed_to_the_scene() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 2, 2);
        let outcome = layer
            .set_tile(&mut scene, (0, 0), &resolved(&tilesets, 8), TileFlip::default())
            .expect("placed");
        let node = scene.node(outcome.placed.node()).expect("node");
        assert_eq!(node.animation.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn offset_shifts_positions_and_queries_consistently() {
        let tilesets = tilesets();
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Isometric, 4, 4);
        let outcome = layer
            .set_tile(&mut scene, (2, 1), &resolved(&tilesets, 1), TileFlip::default())
            .expect("placed");
        let before = scene.node(outcome.placed.node()).expect("node").position;

        layer.set_offset(&mut scene, Vec2::new(10.0, 6.0));
        let after = scene.node(outcome.placed.node()).expect("node").position;
        assert_eq!(after - before, Vec2::new(10.0, -6.0));
        assert_eq!(layer.coord_at_position(after), Some(TileCoord::new(2, 1)));
        assert_eq!(layer.tile_at_position(after).map(Tile::gid), Some(1));
    }

    #[test]
    fn fractional_query_validates_on_floored_value() {
        let mut scene = HeadlessScene::new();
        let layer = layer(&mut scene, Projection::Orthogonal, 2, 2);
        assert_eq!(
            layer.fractional_coord_at_position(Vec2::new(40.0, -8.0), true),
            Some(Vec2::new(1.25, 0.25))
        );
        assert_eq!(layer.fractional_coord_at_position(Vec2::new(80.0, -8.0), true), None);
        assert_eq!(
            layer.fractional_coord_at_position(Vec2::new(80.0, -8.0), false),
            Some(Vec2::new(2.5, 0.25))
        );
    }

    #[test]
    fn screen_position_resolves_through_scene_conversion() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 4, 4);
        layer
            .set_tile(&mut scene, (1, 0), &resolved(&tilesets, 3), TileFlip::default())
            .expect("placed");

        assert_eq!(
            layer.coord_at_screen_position(&scene, Vec2::new(40.0, 20.0)),
            Some(TileCoord::new(1, 0))
        );
        assert_eq!(
            layer
                .tile_at_screen_position(&scene, Vec2::new(40.0, 20.0))
                .map(Tile::gid),
            Some(3)
        );
        assert_eq!(layer.coord_at_screen_position(&scene, Vec2::new(-5.0, 20.0)), None);
    }

    #[test]
    fn clipping_pass_shows_window_and_hides_what_left_it() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 8, 8);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));

        let bounds = Rect::from_origin_size(0.0, 0.0, 64.0, 64.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 0.0);
        assert_eq!(report.visible, 9);
        assert_eq!(report.newly_shown, 9);
        assert!(layer.tile_at((2, 2)).expect("tile").is_visible());
        assert!(!layer.tile_at((3, 0)).expect("tile").is_visible());

        let moved = Rect::from_origin_size(64.0, 64.0, 64.0, 64.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, moved, 1.0, 0.0);
        assert_eq!(report.visible, 9);
        assert_eq!(report.newly_shown, 8);
        assert_eq!(report.newly_hidden, 8);
        assert!(layer.tile_at((2, 2)).expect("tile").is_visible());
        assert!(layer.tile_at((4, 4)).expect("tile").is_visible());
        let hidden = layer.tile_at((0, 0)).expect("tile");
        assert!(!hidden.is_visible());
        assert!(!scene.is_visible(hidden.node()));
    }

    #[test]
    fn identical_pass_is_skipped_until_tiles_change() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 8, 8);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));
        let bounds = Rect::from_origin_size(0.0, 0.0, 64.0, 64.0);

        assert!(!layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 0.0).skipped);
        let repeat = layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 0.0);
        assert!(repeat.skipped);
        assert_eq!(repeat.visible, 9);

        let placed = layer
            .set_tile(&mut scene, (1, 1), &resolved(&tilesets, 2), TileFlip::default())
            .expect("placed");
        assert!(placed.placed.is_visible());
        let outside = layer
            .set_tile(&mut scene, (6, 6), &resolved(&tilesets, 2), TileFlip::default())
            .expect("placed");
        assert!(!outside.placed.is_visible());

        let after_edit = layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 0.0);
        assert!(!after_edit.skipped);
        assert_eq!(after_edit.visible, 9);
    }

    #[test]
    fn tile_buffer_extends_the_window() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 8, 8);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));

        let bounds = Rect::from_origin_size(0.0, 0.0, 64.0, 64.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 1.0);
        assert_eq!(report.visible, 16);
        assert!(layer.tile_at((3, 3)).expect("tile").is_visible());
        assert!(!layer.tile_at((4, 0)).expect("tile").is_visible());
    }

    #[test]
    fn window_moving_by_whole_tiles_past_the_map_edge_is_rescanned() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 8, 8);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));

        let hanging = Rect::from_origin_size(-100.0, 0.0, 200.0, 32.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, hanging, 1.0, 0.0);
        assert!(!report.skipped);
        assert_eq!(report.visible, 6);
        assert!(!layer.tile_at((4, 0)).expect("tile").is_visible());

        let panned = Rect::from_origin_size(-60.0, 0.0, 200.0, 32.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, panned, 1.0, 0.0);
        assert!(!report.skipped);
        assert_eq!(report.visible, 10);
        assert_eq!(report.newly_shown, 4);
        assert_eq!(report.newly_hidden, 0);
        let entered = layer.tile_at((4, 0)).expect("tile");
        assert!(entered.is_visible());
        assert!(scene.is_visible(entered.node()));
    }

    #[test]
    fn isometric_pass_shows_only_diamonds_under_the_window() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Isometric, 4, 4);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));

        // Tile (x, y) is centred on screen ((x - y) * 32, (x + y) * 16 + 16).
        let bounds = Rect::from_origin_size(4.0, 4.0, 56.0, 24.0);
        let report = layer.clip_tiles_out_of_bounds(&mut scene, bounds, 1.0, 0.0);
        assert_eq!(report.visible, 2);
        for coord in [(0, 0), (1, 0)] {
            let tile = layer.tile_at(coord).expect("tile");
            assert!(tile.is_visible(), "{} should be visible", tile.coord());
            assert!(scene.is_visible(tile.node()));
        }
        for coord in [(0, 1), (2, 0), (3, 3)] {
            let tile = layer.tile_at(coord).expect("tile");
            assert!(!tile.is_visible(), "{} should be hidden", tile.coord());
            assert!(!scene.is_visible(tile.node()));
        }
    }

    #[test]
    fn show_all_tiles_ends_clipping() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 8, 8);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));
        layer.clip_tiles_out_of_bounds(
            &mut scene,
            Rect::from_origin_size(0.0, 0.0, 64.0, 64.0),
            1.0,
            0.0,
        );
        assert!(layer.is_clipping());

        layer.show_all_tiles(&mut scene);
        assert!(!layer.is_clipping());
        assert_eq!(layer.visible_tile_count(), 64);
        assert!(layer.tiles().all(|tile| tile.is_visible() && scene.is_visible(tile.node())));
    }

    #[test]
    fn invalid_scale_leaves_visibility_alone() {
        let tilesets = tilesets();
        let mut scene = screen_aligned_scene();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 4, 4);
        layer.initialize_uniform(&mut scene, &tilesets, Gid(1));
        let report = layer.clip_tiles_out_of_bounds(
            &mut scene,
            Rect::from_origin_size(0.0, 0.0, 64.0, 64.0),
            0.0,
            1.0,
        );
        assert_eq!(report.visible, 16);
        assert!(!layer.is_clipping());
    }

    #[test]
    fn opacity_is_clamped() {
        let mut scene = HeadlessScene::new();
        let mut layer = layer(&mut scene, Projection::Orthogonal, 1, 1);
        layer.set_opacity(&mut scene, 1.5);
        assert_eq!(layer.opacity(), 1.0);
        layer.set_opacity(&mut scene, f32::NAN);
        assert_eq!(layer.opacity(), 1.0);
        layer.set_opacity(&mut scene, 0.25);
        assert_eq!(scene.node(layer.node()).expect("node").opacity, 0.25);
    }
}
