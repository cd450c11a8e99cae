use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::layer::{ClipReport, Layer, LayerDesc, LayerError, LoadReport, SetTileOutcome, Tile};
use super::object_group::{ObjectGroup, ObjectGroupDesc};
use super::tileset::{Gid, TileData, Tileset, TilesetRejection, Tilesets};
use crate::geometry::{GridGeometry, MapSize, Projection, Rect, TileCoord, TileSize, Vec2};
use crate::properties::Properties;
use crate::scene::{NodeHandle, SceneHost, TileListener};

pub const MIN_TILE_CLIPPING_SCALE_DEFAULT: f32 = 0.6;
pub const TILE_BUFFER_SIZE_DEFAULT: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingConfig {
    /// Scale below which clipping is suspended and every tile is shown.
    pub min_tile_clipping_scale: f32,
    /// Extra tiles kept visible around the bounds on each edge.
    pub tile_buffer_size: f32,
}

impl Default for ClippingConfig {
    fn default() -> Self {
        Self {
            min_tile_clipping_scale: MIN_TILE_CLIPPING_SCALE_DEFAULT,
            tile_buffer_size: TILE_BUFFER_SIZE_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilemapSettings {
    /// Local origin of placed tiles; the projection's default when unset.
    pub tile_anchor: Option<Vec2>,
    pub alignment: Vec2,
    pub display_bounds: Option<Rect>,
    pub clipping: ClippingConfig,
}

impl Default for TilemapSettings {
    fn default() -> Self {
        Self {
            tile_anchor: None,
            alignment: Vec2::new(0.5, 0.5),
            display_bounds: None,
            clipping: ClippingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClipState {
    #[default]
    Disabled,
    Enabled,
    /// Enabled by the user but suspended because the scale is below
    /// `min_tile_clipping_scale`; every tile is shown.
    AutoSuspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Tileset,
    Layer,
    ObjectGroup,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CollectionKind::Tileset => "tileset",
            CollectionKind::Layer => "layer",
            CollectionKind::ObjectGroup => "object group",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TilemapError {
    #[error("{kind} '{name}' already exists")]
    DuplicateName { kind: CollectionKind, name: String },
    #[error("tileset '{name}' gids {first_gid}..={last_gid} overlap tileset '{existing}'")]
    GidRangeOverlap {
        name: String,
        first_gid: u32,
        last_gid: u32,
        existing: String,
    },
    #[error("tileset '{name}' with {tile_count} tiles from gid {first_gid} runs past the gid limit")]
    GidRangeTooLarge {
        name: String,
        first_gid: u32,
        tile_count: u32,
    },
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),
    #[error("unknown object group '{0}'")]
    UnknownObjectGroup(String),
    #[error("tile clipping needs display bounds or an attached view")]
    ClippingUnavailable,
    #[error("invalid map size {width}x{height}: both dimensions must be positive")]
    InvalidMapSize { width: u32, height: u32 },
    #[error("invalid tile size {width}x{height}: both dimensions must be positive")]
    InvalidTileSize { width: f32, height: f32 },
    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// A tile map driving a host scene graph.
///
/// The map owns its scene host so that every mutation can push node state
/// immediately; use [`Tilemap::scene`] / [`Tilemap::scene_mut`] to reach it.
pub struct Tilemap<S: SceneHost> {
    scene: S,
    node: NodeHandle,
    geometry: GridGeometry,
    alignment: Vec2,
    display_bounds: Option<Rect>,
    clipping: ClippingConfig,
    clip_state: ClipState,
    last_scale: f32,
    tilesets: Tilesets,
    layers: BTreeMap<String, Layer>,
    object_groups: BTreeMap<String, ObjectGroup>,
    listener: Option<Box<dyn TileListener>>,
    properties: Properties,
}

impl<S: SceneHost> Tilemap<S> {
    pub fn new(
        projection: Projection,
        map_size: MapSize,
        tile_size: TileSize,
        settings: TilemapSettings,
        mut scene: S,
    ) -> Result<Self, TilemapError> {
        if map_size.width == 0 || map_size.height == 0 {
            return Err(TilemapError::InvalidMapSize {
                width: map_size.width,
                height: map_size.height,
            });
        }
        if !tile_size.is_valid() {
            return Err(TilemapError::InvalidTileSize {
                width: tile_size.width,
                height: tile_size.height,
            });
        }

        let mut geometry = GridGeometry::new(projection, map_size, tile_size);
        if let Some(anchor) = settings.tile_anchor {
            geometry = geometry.with_tile_anchor(anchor);
        }
        let node = scene.spawn_node(None);
        info!(
            projection = ?projection,
            width = map_size.width,
            height = map_size.height,
            tile_width = tile_size.width,
            tile_height = tile_size.height,
            "tilemap created"
        );

        Ok(Self {
            scene,
            node,
            geometry,
            alignment: clamp_alignment(settings.alignment),
            display_bounds: settings.display_bounds,
            clipping: settings.clipping,
            clip_state: ClipState::Disabled,
            last_scale: 1.0,
            tilesets: Tilesets::default(),
            layers: BTreeMap::new(),
            object_groups: BTreeMap::new(),
            listener: None,
            properties: Properties::new(),
        })
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn into_scene(self) -> S {
        self.scene
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn projection(&self) -> Projection {
        self.geometry.projection
    }

    pub fn map_size(&self) -> MapSize {
        self.geometry.map_size
    }

    pub fn tile_size(&self) -> TileSize {
        self.geometry.tile_size
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    pub fn set_tile_listener(&mut self, listener: Box<dyn TileListener>) {
        self.listener = Some(listener);
    }

    pub fn take_tile_listener(&mut self) -> Option<Box<dyn TileListener>> {
        self.listener.take()
    }

    // Alignment.

    pub fn alignment(&self) -> Vec2 {
        self.alignment
    }

    /// Moves every layer and object group so the map's bounding box rests
    /// at `alignment` (clamped to [0, 1] on both axes) around the origin.
    pub fn set_alignment(&mut self, alignment: Vec2) {
        self.alignment = clamp_alignment(alignment);
        let origin = self.geometry.aligned_origin(self.alignment);
        for layer in self.layers.values_mut() {
            layer.set_position(&mut self.scene, origin);
        }
        for group in self.object_groups.values_mut() {
            group.set_position(&mut self.scene, origin);
        }
        debug!(x = origin.x, y = origin.y, "layers realigned");
    }

    // Tilesets.

    pub fn add_tileset(&mut self, tileset: Tileset) -> Result<&Tileset, TilemapError> {
        let name = tileset.name().to_string();
        let first_gid = tileset.first_gid();
        let last_gid = tileset.last_gid();
        let tile_count = tileset.tile_count();
        match self.tilesets.insert(tileset) {
            Ok(tileset) => Ok(tileset),
            Err(TilesetRejection::DuplicateName) => {
                warn!(tileset = %name, "rejected duplicate tileset");
                Err(TilemapError::DuplicateName {
                    kind: CollectionKind::Tileset,
                    name,
                })
            }
            Err(TilesetRejection::OutOfRange) => {
                warn!(tileset = %name, first_gid, last_gid, "rejected tileset past the gid limit");
                Err(TilemapError::GidRangeTooLarge {
                    name,
                    first_gid,
                    tile_count,
                })
            }
            Err(TilesetRejection::Overlaps { existing }) => {
                warn!(tileset = %name, existing = %existing, "rejected overlapping tileset");
                Err(TilemapError::GidRangeOverlap {
                    name,
                    first_gid,
                    last_gid,
                    existing,
                })
            }
        }
    }

    pub fn tileset(&self, name: &str) -> Option<&Tileset> {
        self.tilesets.get(name)
    }

    pub fn tilesets(&self) -> &Tilesets {
        &self.tilesets
    }

    pub fn tile_data(&self, gid: impl Into<Gid>) -> Option<&TileData> {
        self.tilesets.tile_data(gid.into()).map(|data| data.as_ref())
    }

    pub fn next_available_gid(&self) -> u32 {
        self.tilesets.next_available_gid()
    }

    // Layers.

    pub fn add_layer(&mut self, desc: LayerDesc) -> Result<&Layer, TilemapError> {
        if self.layers.contains_key(&desc.name) {
            warn!(layer = %desc.name, "rejected duplicate layer");
            return Err(TilemapError::DuplicateName {
                kind: CollectionKind::Layer,
                name: desc.name,
            });
        }
        let z_order = desc.z_order.unwrap_or_else(|| self.next_z_order());
        let name = desc.name.clone();
        let mut layer = Layer::new(desc, z_order, self.geometry, &mut self.scene, Some(self.node));
        layer.set_position(&mut self.scene, self.geometry.aligned_origin(self.alignment));
        if self.clip_state == ClipState::Enabled {
            layer.hide_all_tiles(&mut self.scene);
        }
        debug!(layer = %name, z_order, "layer added");
        Ok(self.layers.entry(name).or_insert(layer))
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers in ascending z-order, ties broken by name.
    pub fn layers(&self) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self.layers.values().collect();
        layers.sort_by_key(|layer| layer.z_order());
        layers
    }

    pub fn remove_layer(&mut self, name: &str) -> Result<Layer, TilemapError> {
        let mut layer = self
            .layers
            .remove(name)
            .ok_or_else(|| TilemapError::UnknownLayer(name.to_string()))?;
        let removed = layer.clear_tiles(&mut self.scene);
        if let Some(listener) = self.listener.as_mut() {
            for tile in &removed {
                listener.tile_removed(name, tile.coord());
            }
        }
        self.scene.despawn_node(layer.node());
        debug!(layer = %name, tiles = removed.len(), "layer removed");
        Ok(layer)
    }

    pub fn set_layer_visible(&mut self, name: &str, visible: bool) -> Result<(), TilemapError> {
        let layer = layer_entry(&mut self.layers, name)?;
        layer.set_visible(&mut self.scene, visible);
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, name: &str, opacity: f32) -> Result<(), TilemapError> {
        let layer = layer_entry(&mut self.layers, name)?;
        layer.set_opacity(&mut self.scene, opacity);
        Ok(())
    }

    pub fn set_layer_offset(&mut self, name: &str, offset: Vec2) -> Result<(), TilemapError> {
        let layer = layer_entry(&mut self.layers, name)?;
        layer.set_offset(&mut self.scene, offset);
        Ok(())
    }

    pub fn set_layer_z_order(&mut self, name: &str, z_order: i32) -> Result<(), TilemapError> {
        let layer = layer_entry(&mut self.layers, name)?;
        layer.set_z_order(&mut self.scene, z_order);
        Ok(())
    }

    // Tiles.

    /// Places the tile for `gid` (flip flags included) at `coord`.
    ///
    /// Returns `Ok(None)` for coordinates outside the map and for gids no
    /// tileset provides. Gid 0 clears the cell.
    pub fn set_tile(
        &mut self,
        layer: &str,
        coord: impl Into<TileCoord>,
        gid: impl Into<Gid>,
    ) -> Result<Option<SetTileOutcome>, TilemapError> {
        let coord = coord.into();
        let gid = gid.into();
        if gid.is_empty() {
            self.remove_tile(layer, coord)?;
            return Ok(None);
        }
        let target = layer_entry(&mut self.layers, layer)?;
        let Some(resolved) = self.tilesets.resolve(gid) else {
            warn!(layer, gid = gid.id(), "no tileset provides gid");
            return Ok(None);
        };
        let outcome = target.set_tile(&mut self.scene, coord, &resolved, gid.flip());
        if let (Some(outcome), Some(listener)) = (outcome.as_ref(), self.listener.as_mut()) {
            if let Some(removed) = &outcome.removed {
                listener.tile_removed(layer, removed.coord());
            }
            listener.tile_placed(layer, &outcome.placed);
        }
        Ok(outcome)
    }

    pub fn remove_tile(
        &mut self,
        layer: &str,
        coord: impl Into<TileCoord>,
    ) -> Result<Option<Tile>, TilemapError> {
        let target = layer_entry(&mut self.layers, layer)?;
        let removed = target.remove_tile(&mut self.scene, coord);
        if let (Some(tile), Some(listener)) = (removed.as_ref(), self.listener.as_mut()) {
            listener.tile_removed(layer, tile.coord());
        }
        Ok(removed)
    }

    pub fn tile_at(&self, layer: &str, coord: impl Into<TileCoord>) -> Option<&Tile> {
        self.layers.get(layer)?.tile_at(coord)
    }

    pub fn coord_at_screen_position(&self, layer: &str, screen: Vec2) -> Option<TileCoord> {
        self.layers
            .get(layer)?
            .coord_at_screen_position(&self.scene, screen)
    }

    pub fn tile_at_screen_position(&self, layer: &str, screen: Vec2) -> Option<&Tile> {
        self.layers
            .get(layer)?
            .tile_at_screen_position(&self.scene, screen)
    }

    /// Replaces a layer's tiles with row-major gid data.
    pub fn load_layer_data(&mut self, layer: &str, data: &[u32]) -> Result<LoadReport, TilemapError> {
        let target = layer_entry(&mut self.layers, layer)?;
        let report = target.initialize_from_flat_array(&mut self.scene, &self.tilesets, data)?;
        if let Some(listener) = self.listener.as_mut() {
            notify_reload(listener.as_mut(), layer, target, &report);
        }
        Ok(report)
    }

    pub fn fill_layer(&mut self, layer: &str, gid: impl Into<Gid>) -> Result<LoadReport, TilemapError> {
        let target = layer_entry(&mut self.layers, layer)?;
        let report = target.initialize_uniform(&mut self.scene, &self.tilesets, gid.into());
        if let Some(listener) = self.listener.as_mut() {
            notify_reload(listener.as_mut(), layer, target, &report);
        }
        Ok(report)
    }

    // Object groups.

    pub fn add_object_group(&mut self, desc: ObjectGroupDesc) -> Result<&ObjectGroup, TilemapError> {
        if self.object_groups.contains_key(&desc.name) {
            warn!(object_group = %desc.name, "rejected duplicate object group");
            return Err(TilemapError::DuplicateName {
                kind: CollectionKind::ObjectGroup,
                name: desc.name,
            });
        }
        let z_order = desc.z_order.unwrap_or_else(|| self.next_z_order());
        let name = desc.name.clone();
        let mut group = ObjectGroup::new(desc, z_order, &mut self.scene, Some(self.node));
        group.set_position(&mut self.scene, self.geometry.aligned_origin(self.alignment));
        Ok(self.object_groups.entry(name).or_insert(group))
    }

    pub fn object_group(&self, name: &str) -> Option<&ObjectGroup> {
        self.object_groups.get(name)
    }

    pub fn object_group_mut(&mut self, name: &str) -> Option<&mut ObjectGroup> {
        self.object_groups.get_mut(name)
    }

    pub fn object_groups(&self) -> impl Iterator<Item = &ObjectGroup> + '_ {
        self.object_groups.values()
    }

    pub fn object_group_count(&self) -> usize {
        self.object_groups.len()
    }

    pub fn remove_object_group(&mut self, name: &str) -> Result<ObjectGroup, TilemapError> {
        let group = self
            .object_groups
            .remove(name)
            .ok_or_else(|| TilemapError::UnknownObjectGroup(name.to_string()))?;
        self.scene.despawn_node(group.node());
        Ok(group)
    }

    fn next_z_order(&self) -> i32 {
        self.layers
            .values()
            .map(Layer::z_order)
            .chain(self.object_groups.values().map(ObjectGroup::z_order))
            .max()
            .map_or(0, |z| z + 1)
    }

    // Clipping.

    pub fn clipping_config(&self) -> ClippingConfig {
        self.clipping
    }

    pub fn set_min_tile_clipping_scale(&mut self, scale: f32) {
        self.clipping.min_tile_clipping_scale = scale;
    }

    pub fn set_tile_buffer_size(&mut self, tiles: f32) {
        self.clipping.tile_buffer_size = tiles.max(0.0);
    }

    pub fn display_bounds(&self) -> Option<Rect> {
        self.display_bounds
    }

    /// Explicit screen-space culling bounds; the attached view is used when unset.
    pub fn set_display_bounds(&mut self, bounds: Option<Rect>) {
        self.display_bounds = bounds;
    }

    pub fn clip_state(&self) -> ClipState {
        self.clip_state
    }

    /// Whether the user asked for clipping, including while it is
    /// suspended by a small scale.
    pub fn is_tile_clipping_enabled(&self) -> bool {
        self.clip_state != ClipState::Disabled
    }

    pub fn enable_tile_clipping(&mut self) -> Result<(), TilemapError> {
        if self.clip_state != ClipState::Disabled {
            return Ok(());
        }
        if self.clipping_bounds().is_none() {
            warn!("tile clipping needs display bounds or an attached view");
            return Err(TilemapError::ClippingUnavailable);
        }

        if self.last_scale < self.clipping.min_tile_clipping_scale {
            self.clip_state = ClipState::AutoSuspended;
            info!(scale = self.last_scale, "tile clipping enabled, suspended at current scale");
            return Ok(());
        }
        self.clip_state = ClipState::Enabled;
        for layer in self.layers.values_mut() {
            layer.hide_all_tiles(&mut self.scene);
        }
        info!(scale = self.last_scale, "tile clipping enabled");
        self.run_clip_pass(self.last_scale, self.clipping.tile_buffer_size);
        Ok(())
    }

    pub fn disable_tile_clipping(&mut self) {
        if self.clip_state == ClipState::Disabled {
            return;
        }
        self.clip_state = ClipState::Disabled;
        self.show_all_tiles();
        info!("tile clipping disabled");
    }

    /// Per-frame culling entry point.
    ///
    /// Suspends clipping when `scale` falls below the configured minimum and
    /// resumes it once the scale recovers. Returns the per-layer reports of
    /// the pass, empty when no pass ran.
    pub fn clip_tiles_out_of_bounds(
        &mut self,
        scale: f32,
        tile_buffer_size: f32,
    ) -> BTreeMap<String, ClipReport> {
        if !scale.is_finite() || scale <= 0.0 {
            warn!(scale, "ignored clipping request with invalid scale");
            return BTreeMap::new();
        }
        self.last_scale = scale;
        let min_scale = self.clipping.min_tile_clipping_scale;

        match self.clip_state {
            ClipState::Disabled => BTreeMap::new(),
            ClipState::Enabled if scale < min_scale => {
                self.clip_state = ClipState::AutoSuspended;
                self.show_all_tiles();
                info!(scale, min_scale, "tile clipping suspended");
                BTreeMap::new()
            }
            ClipState::AutoSuspended if scale >= min_scale => {
                self.clip_state = ClipState::Enabled;
                for layer in self.layers.values_mut() {
                    layer.hide_all_tiles(&mut self.scene);
                }
                info!(scale, min_scale, "tile clipping resumed");
                self.run_clip_pass(scale, tile_buffer_size)
            }
            ClipState::AutoSuspended => BTreeMap::new(),
            ClipState::Enabled => self.run_clip_pass(scale, tile_buffer_size),
        }
    }

    /// Runs a pass with the configured tile buffer.
    pub fn clip_tiles(&mut self, scale: f32) -> BTreeMap<String, ClipReport> {
        self.clip_tiles_out_of_bounds(scale, self.clipping.tile_buffer_size)
    }

    fn run_clip_pass(&mut self, scale: f32, tile_buffer_size: f32) -> BTreeMap<String, ClipReport> {
        let Some(bounds) = self.clipping_bounds() else {
            warn!("skipped clipping pass: no display bounds or attached view");
            return BTreeMap::new();
        };
        self.layers
            .iter_mut()
            .map(|(name, layer)| {
                let report =
                    layer.clip_tiles_out_of_bounds(&mut self.scene, bounds, scale, tile_buffer_size);
                (name.clone(), report)
            })
            .collect()
    }

    fn clipping_bounds(&self) -> Option<Rect> {
        self.display_bounds.or_else(|| self.scene.view_bounds())
    }

    fn show_all_tiles(&mut self) {
        for layer in self.layers.values_mut() {
            layer.show_all_tiles(&mut self.scene);
        }
    }
}

fn layer_entry<'a>(
    layers: &'a mut BTreeMap<String, Layer>,
    name: &str,
) -> Result<&'a mut Layer, TilemapError> {
    layers
        .get_mut(name)
        .ok_or_else(|| TilemapError::UnknownLayer(name.to_string()))
}

fn notify_reload(listener: &mut dyn TileListener, name: &str, layer: &Layer, report: &LoadReport) {
    for coord in &report.cleared {
        listener.tile_removed(name, *coord);
    }
    for tile in layer.tiles() {
        listener.tile_placed(name, tile);
    }
}

fn clamp_alignment(alignment: Vec2) -> Vec2 {
    let clamp = |value: f32| if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    Vec2::new(clamp(alignment.x), clamp(alignment.y))
}
