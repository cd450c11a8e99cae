use super::{MapSize, Projection, TileCoord, TileSize, Vec2};

/// Projection-aware transforms between tile coordinates and layer-local
/// pixel positions.
///
/// Layer-local space has y growing upward while map rows grow downward, so
/// row 0 sits at the top of the layer and every row below it has a more
/// negative y. Isometric maps place cell (0, 0) at the top corner of the
/// diamond.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub projection: Projection,
    pub map_size: MapSize,
    pub tile_size: TileSize,
    pub tile_anchor: Vec2,
}

impl GridGeometry {
    pub fn new(projection: Projection, map_size: MapSize, tile_size: TileSize) -> Self {
        Self {
            projection,
            map_size,
            tile_size,
            tile_anchor: projection.default_tile_anchor(),
        }
    }

    pub fn with_tile_anchor(mut self, tile_anchor: Vec2) -> Self {
        self.tile_anchor = tile_anchor;
        self
    }

    pub fn is_valid_coord(&self, coord: TileCoord) -> bool {
        self.map_size.contains(coord)
    }

    /// Anchor position of the tile at `coord`, before any layer offset.
    pub fn tile_position(&self, coord: TileCoord, tileset_offset: Vec2) -> Vec2 {
        let tw = self.tile_size.width;
        let th = self.tile_size.height;
        let anchor = self.tile_anchor;
        let x = coord.x as f32;
        let y = coord.y as f32;

        let mut position = match self.projection {
            Projection::Orthogonal => Vec2::new(
                x * tw + anchor.x * tw,
                -y * th - (th - anchor.y * th),
            ),
            Projection::Isometric => {
                let half = self.tile_size.half();
                Vec2::new(
                    (x - y) * half.x - (half.x - anchor.x * tw),
                    -(x + y) * half.y - (th - anchor.y * th),
                )
            }
        };

        position.x += tileset_offset.x - anchor.x * tileset_offset.x;
        position.y -= tileset_offset.y - anchor.y * tileset_offset.y;
        position
    }

    /// Inverse of [`GridGeometry::tile_position`] without rounding: the
    /// integer part names the cell, the fraction is the position inside it.
    pub fn fractional_coord_at(&self, position: Vec2) -> Vec2 {
        match self.projection {
            Projection::Orthogonal => Vec2::new(
                position.x / self.tile_size.width,
                position.y / -self.tile_size.height,
            ),
            Projection::Isometric => {
                let half = self.tile_size.half();
                let across = position.x / half.x;
                let down = position.y / -half.y;
                Vec2::new((across + down) / 2.0, (down - across) / 2.0)
            }
        }
    }

    pub fn coord_at(&self, position: Vec2) -> TileCoord {
        TileCoord::from_fractional(self.fractional_coord_at(position))
    }

    /// Width and height of the map's bounding box in pixels.
    pub fn projected_size(&self) -> Vec2 {
        let width = self.map_size.width as f32;
        let height = self.map_size.height as f32;
        match self.projection {
            Projection::Orthogonal => Vec2::new(
                width * self.tile_size.width,
                height * self.tile_size.height,
            ),
            Projection::Isometric => {
                let half = self.tile_size.half();
                Vec2::new((width + height) * half.x, (width + height) * half.y)
            }
        }
    }

    /// Bottom-left corner of the map's bounding box in layer-local space.
    pub fn local_min(&self) -> Vec2 {
        let width = self.map_size.width as f32;
        let height = self.map_size.height as f32;
        match self.projection {
            Projection::Orthogonal => Vec2::new(0.0, -height * self.tile_size.height),
            Projection::Isometric => {
                let half = self.tile_size.half();
                Vec2::new(-height * half.x, -(width + height) * half.y)
            }
        }
    }

    /// Layer origin relative to the tilemap origin for an alignment fraction.
    ///
    /// Alignment (0, 0) rests the map's bottom-left corner on the tilemap
    /// origin, (1, 1) its top-right corner.
    pub fn aligned_origin(&self, alignment: Vec2) -> Vec2 {
        -self.projected_size().scale_by(alignment) - self.local_min()
    }
}
