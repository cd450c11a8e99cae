use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{TileSize, Vec2};
use crate::properties::Properties;

pub const FLIP_H: u32 = 0x8000_0000;
pub const FLIP_V: u32 = 0x4000_0000;
pub const FLIP_D: u32 = 0x2000_0000;
pub const GID_MASK: u32 = 0x1FFF_FFFF;

/// Global tile id as stored in layer data, flip flags included.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Gid(pub u32);

impl Gid {
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Id with the flip flags masked off.
    #[inline]
    pub fn id(self) -> u32 {
        self.0 & GID_MASK
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.id() == 0
    }

    #[inline]
    pub fn flip(self) -> TileFlip {
        TileFlip {
            horizontal: self.0 & FLIP_H != 0,
            vertical: self.0 & FLIP_V != 0,
            diagonal: self.0 & FLIP_D != 0,
        }
    }
}

impl From<u32> for Gid {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TileFlip {
    pub horizontal: bool,
    pub vertical: bool,
    pub diagonal: bool,
}

/// Source rectangle of a tile inside its tileset image, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationFrame {
    /// Local id of the frame's tile inside the same tileset.
    pub tile_id: u32,
    pub duration_ms: u32,
}

/// Immutable per-tile-type data shared by every placed tile of that type.
#[derive(Debug, Clone, PartialEq)]
pub struct TileData {
    pub gid: u32,
    pub region: TileRegion,
    pub animation: Option<Vec<AnimationFrame>>,
    pub properties: Properties,
}

impl TileData {
    pub fn has_animation(&self) -> bool {
        self.animation
            .as_ref()
            .is_some_and(|frames| !frames.is_empty())
    }
}

/// Whether `tile_count` gids starting at `first_gid` stay within
/// [`GID_MASK`], so that no gid collides with the flip flags.
pub fn gid_range_fits(first_gid: u32, tile_count: u32) -> bool {
    u64::from(first_gid.max(1)) + u64::from(tile_count) <= u64::from(GID_MASK) + 1
}

/// Atlas layout of a tileset image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub columns: u32,
    pub tile_count: u32,
    pub spacing: u32,
    pub margin: u32,
}

#[derive(Debug, Clone)]
pub struct Tileset {
    name: String,
    first_gid: u32,
    tile_count: u32,
    tile_size: TileSize,
    offset: Vec2,
    tiles: BTreeMap<u32, Arc<TileData>>,
    properties: Properties,
}

impl Tileset {
    /// Empty tileset covering `first_gid..first_gid + tile_count`.
    pub fn new(name: impl Into<String>, first_gid: u32, tile_count: u32, tile_size: TileSize) -> Self {
        Self {
            name: name.into(),
            first_gid: first_gid.max(1),
            tile_count,
            tile_size,
            offset: Vec2::ZERO,
            tiles: BTreeMap::new(),
            properties: Properties::new(),
        }
    }

    /// Tileset whose tiles are cut from a uniform grid in one image. Only
    /// tiles whose gid fits under [`GID_MASK`] get atlas data.
    pub fn atlas(
        name: impl Into<String>,
        first_gid: u32,
        tile_size: TileSize,
        layout: AtlasLayout,
    ) -> Self {
        let mut tileset = Self::new(name, first_gid, layout.tile_count, tile_size);
        let columns = layout.columns.max(1);
        let tile_w = tile_size.width as u32;
        let tile_h = tile_size.height as u32;
        let claimable = layout
            .tile_count
            .min((GID_MASK + 1).saturating_sub(tileset.first_gid));
        for local_id in 0..claimable {
            let col = local_id % columns;
            let row = local_id / columns;
            let region = TileRegion {
                x: layout
                    .margin
                    .saturating_add(col.saturating_mul(tile_w.saturating_add(layout.spacing))),
                y: layout
                    .margin
                    .saturating_add(row.saturating_mul(tile_h.saturating_add(layout.spacing))),
                width: tile_w,
                height: tile_h,
            };
            tileset.tiles.insert(
                local_id,
                Arc::new(TileData {
                    gid: tileset.first_gid + local_id,
                    region,
                    animation: None,
                    properties: Properties::new(),
                }),
            );
        }
        tileset
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Inserts or replaces the data for `local_id`. Ids outside the
    /// tileset's range are ignored and reported as `false`.
    pub fn insert_tile(
        &mut self,
        local_id: u32,
        region: TileRegion,
        animation: Option<Vec<AnimationFrame>>,
        properties: Properties,
    ) -> bool {
        let Some(gid) = self
            .first_gid
            .checked_add(local_id)
            .filter(|gid| local_id < self.tile_count && *gid <= GID_MASK)
        else {
            return false;
        };
        self.tiles.insert(
            local_id,
            Arc::new(TileData {
                gid,
                region,
                animation,
                properties,
            }),
        );
        true
    }

    /// Attaches animation frames and properties to an existing tile.
    pub fn annotate_tile(
        &mut self,
        local_id: u32,
        animation: Option<Vec<AnimationFrame>>,
        properties: Properties,
    ) -> bool {
        let region = match self.tiles.get(&local_id) {
            Some(existing) => existing.region,
            None => TileRegion::default(),
        };
        self.insert_tile(local_id, region, animation, properties)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_gid(&self) -> u32 {
        self.first_gid
    }

    pub fn last_gid(&self) -> u32 {
        self.first_gid
            .saturating_add(self.tile_count)
            .saturating_sub(1)
    }

    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    pub fn fits_gid_range(&self) -> bool {
        gid_range_fits(self.first_gid, self.tile_count)
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn contains_gid(&self, gid: Gid) -> bool {
        self.tile_count > 0 && (self.first_gid..=self.last_gid()).contains(&gid.id())
    }

    pub fn local_id(&self, gid: Gid) -> Option<u32> {
        self.contains_gid(gid).then(|| gid.id() - self.first_gid)
    }

    pub fn tile_data_by_local_id(&self, local_id: u32) -> Option<&Arc<TileData>> {
        self.tiles.get(&local_id)
    }

    pub fn tile_data(&self, gid: Gid) -> Option<&Arc<TileData>> {
        self.local_id(gid)
            .and_then(|local_id| self.tile_data_by_local_id(local_id))
    }

    fn overlaps(&self, other: &Tileset) -> bool {
        self.tile_count > 0
            && other.tile_count > 0
            && self.first_gid <= other.last_gid()
            && other.first_gid <= self.last_gid()
    }
}

/// Tileset data resolved together with the tileset offset it is drawn with.
#[derive(Debug, Clone)]
pub struct ResolvedTile {
    pub data: Arc<TileData>,
    pub tileset_offset: Vec2,
}

/// Name-keyed tileset collection with non-overlapping gid ranges.
#[derive(Debug, Default, Clone)]
pub struct Tilesets {
    by_name: BTreeMap<String, Tileset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TilesetRejection {
    DuplicateName,
    OutOfRange,
    Overlaps { existing: String },
}

impl Tilesets {
    pub(crate) fn insert(&mut self, tileset: Tileset) -> Result<&Tileset, TilesetRejection> {
        if self.by_name.contains_key(tileset.name()) {
            return Err(TilesetRejection::DuplicateName);
        }
        if !tileset.fits_gid_range() {
            return Err(TilesetRejection::OutOfRange);
        }
        if let Some(existing) = self.by_name.values().find(|other| other.overlaps(&tileset)) {
            return Err(TilesetRejection::Overlaps {
                existing: existing.name().to_string(),
            });
        }
        let name = tileset.name().to_string();
        Ok(self.by_name.entry(name).or_insert(tileset))
    }

    pub fn get(&self, name: &str) -> Option<&Tileset> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tileset> {
        self.by_name.values()
    }

    /// One past the highest gid claimed by any tileset.
    pub fn next_available_gid(&self) -> u32 {
        self.by_name
            .values()
            .filter(|tileset| tileset.tile_count > 0)
            .map(|tileset| tileset.last_gid().saturating_add(1))
            .max()
            .unwrap_or(1)
    }

    pub fn tile_data(&self, gid: Gid) -> Option<&Arc<TileData>> {
        self.by_name
            .values()
            .find_map(|tileset| tileset.tile_data(gid))
    }

    pub fn resolve(&self, gid: Gid) -> Option<ResolvedTile> {
        self.by_name.values().find_map(|tileset| {
            tileset.tile_data(gid).map(|data| ResolvedTile {
                data: Arc::clone(data),
                tileset_offset: tileset.offset(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terrain() -> Tileset {
        Tileset::atlas(
            "terrain",
            1,
            TileSize::new(32.0, 32.0),
            AtlasLayout {
                columns: 4,
                tile_count: 8,
                spacing: 2,
                margin: 1,
            },
        )
    }

    #[test]
    fn gid_masks_flip_flags() {
        let gid = Gid(FLIP_H | FLIP_D | 7);
        assert_eq!(gid.id(), 7);
        assert_eq!(
            gid.flip(),
            TileFlip {
                horizontal: true,
                vertical: false,
                diagonal: true,
            }
        );
        assert!(Gid(FLIP_V).is_empty());
    }

    #[test]
    fn atlas_regions_account_for_margin_and_spacing() {
        let tileset = terrain();
        assert_eq!(tileset.last_gid(), 8);
        let data = tileset.tile_data(Gid(6)).expect("gid 6");
        assert_eq!(
            data.region,
            TileRegion {
                x: 1 + 34,
                y: 1 + 34,
                width: 32,
                height: 32,
            }
        );
        assert!(tileset.tile_data(Gid(9)).is_none());
        assert!(tileset.tile_data(Gid(0)).is_none());
    }

    #[test]
    fn annotate_keeps_region_and_adds_animation() {
        let mut tileset = terrain();
        let frames = vec![
            AnimationFrame {
                tile_id: 0,
                duration_ms: 100,
            },
            AnimationFrame {
                tile_id: 1,
                duration_ms: 100,
            },
        ];
        assert!(tileset.annotate_tile(0, Some(frames), Properties::new()));
        let data = tileset.tile_data(Gid(1)).expect("gid 1");
        assert!(data.has_animation());
        assert_eq!(data.region.x, 1);
        assert!(!tileset.annotate_tile(99, None, Properties::new()));
    }

    #[test]
    fn collection_rejects_duplicate_names_and_overlapping_ranges() {
        let mut tilesets = Tilesets::default();
        tilesets.insert(terrain()).expect("first insert");
        assert_eq!(
            tilesets.insert(Tileset::new("terrain", 100, 4, TileSize::new(32.0, 32.0))).err(),
            Some(TilesetRejection::DuplicateName)
        );
        assert_eq!(
            tilesets.insert(Tileset::new("props", 8, 4, TileSize::new(32.0, 32.0))).err(),
            Some(TilesetRejection::Overlaps {
                existing: "terrain".to_string()
            })
        );
        assert_eq!(tilesets.len(), 1);
        assert_eq!(tilesets.next_available_gid(), 9);
    }

    #[test]
    fn ranges_past_the_flip_flags_are_rejected_without_overflow() {
        let big = Tileset::new("big", u32::MAX - 1, 5, TileSize::new(32.0, 32.0));
        assert_eq!(big.last_gid(), u32::MAX - 1);
        assert!(!big.fits_gid_range());
        assert!(!gid_range_fits(GID_MASK, 2));
        assert!(gid_range_fits(GID_MASK, 1));
        assert!(gid_range_fits(0, GID_MASK));

        let mut tilesets = Tilesets::default();
        assert_eq!(tilesets.insert(big).err(), Some(TilesetRejection::OutOfRange));
        assert!(tilesets.is_empty());

        let mut top = Tileset::new("top", GID_MASK, 1, TileSize::new(32.0, 32.0));
        assert!(top.insert_tile(0, TileRegion::default(), None, Properties::new()));
        assert!(!top.insert_tile(u32::MAX, TileRegion::default(), None, Properties::new()));
        tilesets.insert(top).expect("last gid fits");
        assert_eq!(tilesets.next_available_gid(), GID_MASK + 1);
        assert_eq!(tilesets.tile_data(Gid(GID_MASK)).map(|data| data.gid), Some(GID_MASK));
    }

    #[test]
    fn atlas_stops_at_the_last_representable_gid() {
        let tileset = Tileset::atlas(
            "edge",
            GID_MASK - 1,
            TileSize::new(32.0, 32.0),
            AtlasLayout {
                columns: 0,
                tile_count: 16,
                spacing: u32::MAX,
                margin: 0,
            },
        );
        assert!(tileset.tile_data_by_local_id(1).is_some());
        assert!(tileset.tile_data_by_local_id(2).is_none());
        assert_eq!(tileset.tile_data_by_local_id(1).map(|data| data.region.y), Some(u32::MAX));
    }

    #[test]
    fn lookup_scans_across_tilesets() {
        let mut tilesets = Tilesets::default();
        assert_eq!(tilesets.next_available_gid(), 1);
        tilesets.insert(terrain()).expect("terrain");
        let props = Tileset::atlas(
            "props",
            9,
            TileSize::new(32.0, 64.0),
            AtlasLayout {
                columns: 2,
                tile_count: 2,
                spacing: 0,
                margin: 0,
            },
        )
        .with_offset(Vec2::new(0.0, 16.0));
        tilesets.insert(props).expect("props");

        let resolved = tilesets.resolve(Gid(FLIP_H | 10)).expect("gid 10");
        assert_eq!(resolved.data.gid, 10);
        assert_eq!(resolved.tileset_offset, Vec2::new(0.0, 16.0));
        assert_eq!(tilesets.tile_data(Gid(3)).map(|data| data.gid), Some(3));
        assert!(tilesets.tile_data(Gid(11)).is_none());
        assert_eq!(tilesets.next_available_gid(), 11);
    }
}
