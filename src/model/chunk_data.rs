use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use voxelworld_derive::Entity;

use crate::err::WorldError;
use crate::ident::chunk_key::ChunkKey;
use crate::model::block::{LayerBlock, Vector3i};

/// Sparse blocks one ground layer defines inside one chunk. Positions are world coordinates
/// and unique within the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "layer_chunks")]
#[serde(rename_all = "camelCase")]
pub(crate) struct LayerChunkData {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    pub(crate) world_id: String,
    pub(crate) layer_data_id: String,
    pub(crate) chunk_key: String,
    #[serde(default)]
    pub(crate) blocks: Vec<LayerBlock>,
}

impl LayerChunkData {
    pub(crate) fn document_id(layer_data_id: &str, chunk_key: &ChunkKey) -> String {
        format!("{layer_data_id}/{chunk_key}")
    }

    pub(crate) fn new(world_id: &str, layer_data_id: &str, chunk_key: ChunkKey, blocks: Vec<LayerBlock>) -> Self {
        let mut data = Self {
            id: Self::document_id(layer_data_id, &chunk_key),
            world_id: world_id.to_string(),
            layer_data_id: layer_data_id.to_string(),
            chunk_key: chunk_key.to_string(),
            blocks,
        };
        data.dedupe();
        data
    }

    pub(crate) fn key(&self) -> Result<ChunkKey, WorldError> {
        ChunkKey::parse(&self.chunk_key)
    }

    pub(crate) fn block_at(&self, position: Vector3i) -> Option<&LayerBlock> {
        self.blocks.iter().find(|block| block.position() == position)
    }

    /// Inserts or replaces the block at its position.
    pub(crate) fn set_block(&mut self, block: LayerBlock) {
        match self.blocks.iter_mut().find(|b| b.position() == block.position()) {
            Some(existing) => *existing = block,
            None => self.blocks.push(block),
        }
    }

    pub(crate) fn remove_block(&mut self, position: Vector3i) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|block| block.position() != position);
        before != self.blocks.len()
    }

    /// Collapses duplicate positions, keeping the last entry for each.
    pub(crate) fn dedupe(&mut self) {
        let mut seen = HashSet::new();
        let mut kept: Vec<LayerBlock> = self
            .blocks
            .drain(..)
            .rev()
            .filter(|block| seen.insert(block.position()))
            .collect();
        kept.reverse();
        self.blocks = kept;
    }

    /// Rejects blocks outside the chunk and malformed block type ids.
    pub(crate) fn validate(&self, chunk_size: i32) -> Result<(), WorldError> {
        let key = self.key()?;
        for block in &self.blocks {
            let position = block.position();
            if !key.contains(position.x, position.z, chunk_size) {
                return Err(WorldError::Validation(format!(
                    "block at {},{},{} is outside chunk {key}",
                    position.x, position.y, position.z
                )));
            }
            block.validate()?;
        }
        Ok(())
    }
}
