pub mod geometry;
pub mod map;
pub mod properties;
pub mod scene;

pub use geometry::{GridGeometry, MapSize, Projection, Rect, TileCoord, TileSize, Vec2};
pub use map::{
    ClipReport, ClipState, ClippingConfig, Gid, Layer, LayerDesc, LayerError, MapDescription,
    ObjectGroup, ObjectGroupDesc, Tile, Tilemap, TilemapError, TilemapSettings, Tileset,
};
pub use properties::{Properties, PropertyValue};
pub use scene::{Camera2D, HeadlessScene, NodeHandle, SceneHost, TileListener};
