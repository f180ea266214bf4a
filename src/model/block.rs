use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::err::WorldError;
use crate::ident::block_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub(crate) struct Vector3i {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: i32,
}

impl Vector3i {
    pub(crate) fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn offset(&self, other: &Vector3i) -> Vector3i {
        Vector3i::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

/// One block in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Block {
    pub(crate) position: Vector3i,
    pub(crate) block_type_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) modifiers: BTreeMap<String, String>,
}

impl Block {
    pub(crate) fn new(x: i32, y: i32, z: i32, block_type_id: &str) -> Self {
        Self {
            position: Vector3i::new(x, y, z),
            block_type_id: block_type_id.to_string(),
            modifiers: BTreeMap::new(),
        }
    }

    pub(crate) fn is_air(&self) -> bool {
        block_type::is_air(&self.block_type_id)
    }
}

/// A block as stored by a layer: the block plus the structure group it belongs to.
///
/// An air block is an explicit override. A position without any `LayerBlock` is transparent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LayerBlock {
    pub(crate) block: Block,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) group: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) metadata: BTreeMap<String, String>,
}

impl LayerBlock {
    pub(crate) fn new(block: Block) -> Self {
        Self {
            block,
            group: None,
            metadata: BTreeMap::new(),
        }
    }

    pub(crate) fn in_group(mut self, group: i32) -> Self {
        self.group = Some(group);
        self
    }

    pub(crate) fn position(&self) -> Vector3i {
        self.block.position
    }

    pub(crate) fn validate(&self) -> Result<(), WorldError> {
        block_type::validate(&self.block.block_type_id)
    }

    /// Validates the block type id and rewrites it to its `group/name` lowercase form.
    pub(crate) fn normalize(&mut self) -> Result<(), WorldError> {
        self.validate()?;
        self.block.block_type_id = block_type::normalize(&self.block.block_type_id);
        Ok(())
    }
}
