use serde::Deserialize;

use super::tileset::Gid;
use crate::geometry::Vec2;
use crate::properties::Properties;
use crate::scene::{NodeHandle, SceneHost};

/// Free-form object placed on a map, in map-editor pixels (y down).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapObject {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub gid: Option<Gid>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub properties: Properties,
}

fn visible_by_default() -> bool {
    true
}

impl MapObject {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: String::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            gid: None,
            visible: true,
            properties: Properties::new(),
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGroupDesc {
    pub name: String,
    pub offset: Vec2,
    pub opacity: f32,
    pub visible: bool,
    pub z_order: Option<i32>,
    pub objects: Vec<MapObject>,
    pub properties: Properties,
}

impl ObjectGroupDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: Vec2::ZERO,
            opacity: 1.0,
            visible: true,
            z_order: None,
            objects: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_objects(mut self, objects: Vec<MapObject>) -> Self {
        self.objects = objects;
        self
    }
}

/// Named container of map objects. Only ownership and placement are
/// tracked here; interpreting the objects is up to the host.
#[derive(Debug)]
pub struct ObjectGroup {
    name: String,
    offset: Vec2,
    opacity: f32,
    visible: bool,
    z_order: i32,
    position: Vec2,
    node: NodeHandle,
    objects: Vec<MapObject>,
    properties: Properties,
}

impl ObjectGroup {
    pub(crate) fn new(
        desc: ObjectGroupDesc,
        z_order: i32,
        scene: &mut dyn SceneHost,
        parent: Option<NodeHandle>,
    ) -> Self {
        let node = scene.spawn_node(parent);
        let opacity = desc.opacity.clamp(0.0, 1.0);
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
            objects: desc.objects,
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

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn objects(&self) -> &[MapObject] {
        &self.objects
    }

    pub fn object_by_id(&self, id: u32) -> Option<&MapObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    /// First object carrying `name`; names are not unique within a group.
    pub fn object_by_name(&self, name: &str) -> Option<&MapObject> {
        self.objects.iter().find(|object| object.name == name)
    }

    pub fn objects_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a MapObject> + 'a {
        self.objects.iter().filter(move |object| object.kind == kind)
    }

    pub fn add_object(&mut self, object: MapObject) {
        self.objects.push(object);
    }

    pub fn remove_object(&mut self, id: u32) -> Option<MapObject> {
        let index = self.objects.iter().position(|object| object.id == id)?;
        Some(self.objects.remove(index))
    }

    pub fn set_visible(&mut self, scene: &mut dyn SceneHost, visible: bool) {
        self.visible = visible;
        scene.set_visible(self.node, visible);
    }

    pub(crate) fn set_position(&mut self, scene: &mut dyn SceneHost, position: Vec2) {
        self.position = position;
        scene.set_position(self.node, position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::HeadlessScene;

    fn group(scene: &mut HeadlessScene) -> ObjectGroup {
        let mut spawn = MapObject::new(1, "spawn");
        spawn.kind = "marker".to_string();
        let mut chest = MapObject::new(2, "chest");
        chest.kind = "loot".to_string();
        let mut exit = MapObject::new(3, "exit");
        exit.kind = "marker".to_string();
        ObjectGroup::new(
            ObjectGroupDesc::new("objects").with_objects(vec![spawn, chest, exit]),
            2,
            scene,
            None,
        )
    }

    #[test]
    fn lookup_by_id_name_and_kind() {
        let mut scene = HeadlessScene::new();
        let group = group(&mut scene);
        assert_eq!(group.object_by_id(2).map(|object| object.name.as_str()), Some("chest"));
        assert_eq!(group.object_by_name("exit").map(|object| object.id), Some(3));
        assert!(group.object_by_name("missing").is_none());
        assert_eq!(
            group.objects_of_kind("marker").map(|object| object.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(scene.node(group.node()).expect("node").z_order, 2);
    }

    #[test]
    fn remove_object_by_id() {
        let mut scene = HeadlessScene::new();
        let mut group = group(&mut scene);
        assert_eq!(group.remove_object(1).map(|object| object.name), Some("spawn".to_string()));
        assert!(group.remove_object(1).is_none());
        assert_eq!(group.objects().len(), 2);
    }

    #[test]
    fn object_fields_default_when_absent() {
        let object: MapObject = serde_json::from_value(serde_json::json!({
            "id": 7,
            "type": "door",
            "x": 16.0,
            "y": 8.0,
            "gid": 2147483653u32
        }))
        .expect("object");
        assert_eq!(object.kind, "door");
        assert_eq!(object.position(), Vec2::new(16.0, 8.0));
        assert!(object.visible);
        let gid = object.gid.expect("gid");
        assert_eq!(gid.id(), 5);
        assert!(gid.flip().horizontal);
    }
}
