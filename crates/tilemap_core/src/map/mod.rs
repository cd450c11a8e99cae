mod description;
mod layer;
mod object_group;
mod store;
mod tilemap;
mod tileset;

pub use description::{
    LayerDescription, MapDescription, ObjectGroupDescription, TileDescription,
    TileLayerDescription, TilesetDescription,
};
pub use layer::{ClipReport, Layer, LayerDesc, LayerError, LoadReport, SetTileOutcome, Tile};
pub use object_group::{MapObject, ObjectGroup, ObjectGroupDesc};
pub use store::{Placement, TileStore};
pub use tilemap::{
    ClipState, ClippingConfig, CollectionKind, Tilemap, TilemapError, TilemapSettings,
    MIN_TILE_CLIPPING_SCALE_DEFAULT, TILE_BUFFER_SIZE_DEFAULT,
};
pub use tileset::{
    gid_range_fits, AnimationFrame, AtlasLayout, Gid, ResolvedTile, TileData, TileFlip, TileRegion,
    Tileset, Tilesets, FLIP_D, FLIP_H, FLIP_V, GID_MASK,
};
