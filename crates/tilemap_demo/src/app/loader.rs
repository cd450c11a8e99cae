use std::fs;
use std::path::Path;

use tilemap_core::map::{
    AnimationFrame, LayerDescription, MapObject, ObjectGroupDescription, TileDescription,
    TileLayerDescription, TilesetDescription,
};
use tilemap_core::{MapDescription, Projection, Properties, PropertyValue};
use tracing::info;

use super::DemoError;

const BUILTIN_MAP_SIZE: u32 = 48;
const BUILTIN_TILE_PX: f32 = 32.0;
const WATER_GID: u32 = 4;

pub(crate) fn load_description(path: &Path) -> Result<MapDescription, DemoError> {
    let raw = fs::read_to_string(path).map_err(|source| DemoError::ReadMap {
        path: path.to_path_buf(),
        source,
    })?;
    let description = parse_description(&raw, &path.display().to_string())?;
    info!(
        path = %path.display(),
        width = description.width,
        height = description.height,
        "map_description_loaded"
    );
    Ok(description)
}

pub(crate) fn parse_description(raw: &str, origin: &str) -> Result<MapDescription, DemoError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, MapDescription>(&mut deserializer).map_err(|error| {
        let location = error.path().to_string();
        DemoError::ParseMap {
            origin: origin.to_string(),
            location,
            message: error.into_inner().to_string(),
        }
    })
}

/// Orthogonal island map used when no description file is given: a water
/// border around grass with a few animated water tiles and a decor layer.
pub(crate) fn builtin_description() -> MapDescription {
    let size = BUILTIN_MAP_SIZE;
    let mut ground = Vec::with_capacity((size * size) as usize);
    let mut decor = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let border = x < 2 || y < 2 || x >= size - 2 || y >= size - 2;
            ground.push(if border { WATER_GID } else { 1 + (x + y) % 2 });
            decor.push(if !border && x % 7 == 3 && y % 5 == 2 { 3 } else { 0 });
        }
    }

    let mut water_properties = Properties::new();
    water_properties.insert("walkable".to_string(), PropertyValue::Bool(false));

    let mut spawn = MapObject::new(1, "spawn");
    spawn.kind = "marker".to_string();
    spawn.x = BUILTIN_TILE_PX * 4.0;
    spawn.y = BUILTIN_TILE_PX * 4.0;

    MapDescription {
        version: Some("builtin".to_string()),
        orientation: Projection::Orthogonal,
        width: size,
        height: size,
        tile_width: BUILTIN_TILE_PX,
        tile_height: BUILTIN_TILE_PX,
        tilesets: vec![TilesetDescription {
            name: "terrain".to_string(),
            first_gid: 1,
            tile_width: BUILTIN_TILE_PX,
            tile_height: BUILTIN_TILE_PX,
            tile_count: 4,
            columns: 2,
            spacing: 0,
            margin: 0,
            offset_x: 0.0,
            offset_y: 0.0,
            tiles: vec![TileDescription {
                id: WATER_GID - 1,
                animation: Some(vec![
                    AnimationFrame {
                        tile_id: WATER_GID - 1,
                        duration_ms: 400,
                    },
                    AnimationFrame {
                        tile_id: WATER_GID - 2,
                        duration_ms: 400,
                    },
                ]),
                properties: water_properties,
            }],
            properties: Properties::new(),
        }],
        layers: vec![
            LayerDescription::TileLayer(tile_layer("ground", ground)),
            LayerDescription::TileLayer(tile_layer("decor", decor)),
            LayerDescription::ObjectGroup(ObjectGroupDescription {
                name: "markers".to_string(),
                objects: vec![spawn],
                offset_x: 0.0,
                offset_y: 0.0,
                opacity: 1.0,
                visible: true,
                properties: Properties::new(),
            }),
        ],
        properties: Properties::new(),
    }
}

fn tile_layer(name: &str, data: Vec<u32>) -> TileLayerDescription {
    TileLayerDescription {
        name: name.to_string(),
        data,
        offset_x: 0.0,
        offset_y: 0.0,
        opacity: 1.0,
        visible: true,
        properties: Properties::new(),
    }
}
