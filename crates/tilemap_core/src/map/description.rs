//! Pre-parsed map descriptions as handed over by a map loader.

use serde::Deserialize;
use tracing::{info, warn};

use super::layer::LayerDesc;
use super::object_group::{MapObject, ObjectGroupDesc};
use super::tilemap::{Tilemap, TilemapError, TilemapSettings};
use super::tileset::{gid_range_fits, AnimationFrame, AtlasLayout, Tileset};
use crate::geometry::{MapSize, Projection, TileSize, Vec2};
use crate::properties::Properties;
use crate::scene::SceneHost;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapDescription {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub orientation: Projection,
    pub width: u32,
    pub height: u32,
    pub tile_width: f32,
    pub tile_height: f32,
    #[serde(default)]
    pub tilesets: Vec<TilesetDescription>,
    /// Tile layers and object groups in document order.
    #[serde(default)]
    pub layers: Vec<LayerDescription>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TilesetDescription {
    pub name: String,
    pub first_gid: u32,
    pub tile_width: f32,
    pub tile_height: f32,
    pub tile_count: u32,
    #[serde(default)]
    pub columns: u32,
    #[serde(default)]
    pub spacing: u32,
    #[serde(default)]
    pub margin: u32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
    #[serde(default)]
    pub tiles: Vec<TileDescription>,
    #[serde(default)]
    pub properties: Properties,
}

/// Per-tile extras; tiles without extras are not listed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TileDescription {
    pub id: u32,
    #[serde(default)]
    pub animation: Option<Vec<AnimationFrame>>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerDescription {
    TileLayer(TileLayerDescription),
    ObjectGroup(ObjectGroupDescription),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TileLayerDescription {
    pub name: String,
    /// Row-major gids; empty leaves the layer empty.
    #[serde(default)]
    pub data: Vec<u32>,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
    #[serde(default = "opaque")]
    pub opacity: f32,
    #[serde(default = "shown")]
    pub visible: bool,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectGroupDescription {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<MapObject>,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
    #[serde(default = "opaque")]
    pub opacity: f32,
    #[serde(default = "shown")]
    pub visible: bool,
    #[serde(default)]
    pub properties: Properties,
}

fn opaque() -> f32 {
    1.0
}

fn shown() -> bool {
    true
}

impl TilesetDescription {
    fn build(self) -> Result<Tileset, TilemapError> {
        if !gid_range_fits(self.first_gid, self.tile_count) {
            warn!(
                tileset = %self.name,
                first_gid = self.first_gid,
                tile_count = self.tile_count,
                "rejected tileset description past the gid limit"
            );
            return Err(TilemapError::GidRangeTooLarge {
                name: self.name,
                first_gid: self.first_gid,
                tile_count: self.tile_count,
            });
        }
        let columns = if self.columns == 0 {
            self.tile_count
        } else {
            self.columns
        };
        let mut tileset = Tileset::atlas(
            self.name,
            self.first_gid,
            TileSize::new(self.tile_width, self.tile_height),
            AtlasLayout {
                columns,
                tile_count: self.tile_count,
                spacing: self.spacing,
                margin: self.margin,
            },
        )
        .with_offset(Vec2::new(self.offset_x, self.offset_y))
        .with_properties(self.properties);
        for tile in self.tiles {
            if !tileset.annotate_tile(tile.id, tile.animation, tile.properties) {
                warn!(
                    tileset = %tileset.name(),
                    tile_id = tile.id,
                    "ignored extras for tile outside tileset"
                );
            }
        }
        Ok(tileset)
    }
}

impl<S: SceneHost> Tilemap<S> {
    /// Builds a complete map: tilesets first, then layers and object groups
    /// in document order.
    pub fn from_description(
        description: MapDescription,
        settings: TilemapSettings,
        scene: S,
    ) -> Result<Self, TilemapError> {
        let mut map = Tilemap::new(
            description.orientation,
            MapSize::new(description.width, description.height),
            TileSize::new(description.tile_width, description.tile_height),
            settings,
            scene,
        )?;
        map.set_properties(description.properties);

        for tileset in description.tilesets {
            map.add_tileset(tileset.build()?)?;
        }

        for layer in description.layers {
            match layer {
                LayerDescription::TileLayer(layer) => {
                    let desc = LayerDesc {
                        offset: Vec2::new(layer.offset_x, layer.offset_y),
                        opacity: layer.opacity,
                        visible: layer.visible,
                        z_order: None,
                        properties: layer.properties,
                        name: layer.name,
                    };
                    let name = desc.name.clone();
                    map.add_layer(desc)?;
                    if !layer.data.is_empty() {
                        map.load_layer_data(&name, &layer.data)?;
                    }
                }
                LayerDescription::ObjectGroup(group) => {
                    map.add_object_group(ObjectGroupDesc {
                        name: group.name,
                        offset: Vec2::new(group.offset_x, group.offset_y),
                        opacity: group.opacity,
                        visible: group.visible,
                        z_order: None,
                        objects: group.objects,
                        properties: group.properties,
                    })?;
                }
            }
        }

        info!(
            version = description.version.as_deref().unwrap_or("unknown"),
            tilesets = map.tilesets().len(),
            layers = map.layer_count(),
            object_groups = map.object_group_count(),
            "map description loaded"
        );
        Ok(map)
    }
}
