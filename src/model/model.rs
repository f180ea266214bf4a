use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use voxelworld_derive::Entity;

use crate::err::WorldError;
use crate::ident::chunk_key::ChunkKey;
use crate::model::block::{LayerBlock, Vector3i};

/// A block structure placed by a MODEL layer. `content` is in model-local coordinates and
/// lands in the world at the mount offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "layer_models")]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorldModel {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    pub(crate) world_id: String,
    pub(crate) layer_data_id: String,
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    pub(crate) mount_x: i32,
    pub(crate) mount_y: i32,
    pub(crate) mount_z: i32,
    /// Precedence among models of one layer; higher wins where they overlap.
    #[serde(default)]
    pub(crate) order: i32,
    /// Symbolic group name to numeric group id.
    #[serde(default)]
    pub(crate) groups: BTreeMap<String, i32>,
    #[serde(default)]
    pub(crate) content: Vec<LayerBlock>,
}

impl WorldModel {
    pub(crate) fn mount(&self) -> Vector3i {
        Vector3i::new(self.mount_x, self.mount_y, self.mount_z)
    }

    /// The content block covering a world coordinate. Later entries win.
    pub(crate) fn block_at_world(&self, position: Vector3i) -> Option<&LayerBlock> {
        let local = Vector3i::new(
            position.x - self.mount_x,
            position.y - self.mount_y,
            position.z - self.mount_z,
        );
        self.content.iter().rev().find(|block| block.position() == local)
    }

    /// Content blocks paired with their world positions.
    pub(crate) fn world_blocks(&self) -> impl Iterator<Item = (Vector3i, &LayerBlock)> {
        let mount = self.mount();
        self.content
            .iter()
            .map(move |block| (block.position().offset(&mount), block))
    }

    pub(crate) fn group_name(&self, group: i32) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, id)| **id == group)
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn chunk_keys(&self, chunk_size: i32) -> BTreeSet<ChunkKey> {
        self.world_blocks()
            .map(|(position, _)| ChunkKey::from_world(position.x, position.z, chunk_size))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), WorldError> {
        if self.name.trim().is_empty() {
            return Err(WorldError::Validation("model name must not be empty".into()));
        }
        self.content.iter().try_for_each(LayerBlock::validate)
    }
}
