use serde::{Deserialize, Serialize};
use voxelworld_derive::Entity;
use voxelworld_lib::web::dto;

use crate::ident::chunk_key::ChunkKey;
use crate::model::block::Block;

/// Entity type recorded on terrain blobs.
pub(crate) const CHUNK_DATA_TYPE: &str = "ChunkData";

/// Cache record pointing at the compressed merged view of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Entity)]
#[entity(collection = "terrain")]
#[serde(rename_all = "camelCase")]
pub(crate) struct TerrainChunk {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    pub(crate) world_id: String,
    pub(crate) chunk_key: String,
    pub(crate) storage_id: String,
    pub(crate) compressed: bool,
    pub(crate) block_count: u64,
    pub(crate) generated_at: u64,
}

impl TerrainChunk {
    pub(crate) fn document_id(main_world_id: &str, chunk_key: &ChunkKey) -> String {
        format!("{main_world_id}/{chunk_key}")
    }
}

/// The merged view of a chunk: every non-air block, sorted by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChunkData {
    pub(crate) world_id: String,
    pub(crate) chunk_key: String,
    pub(crate) blocks: Vec<Block>,
}

impl ChunkData {
    pub(crate) fn to_dto(&self) -> dto::Chunk {
        dto::Chunk {
            world_id: self.world_id.clone(),
            chunk_key: self.chunk_key.clone(),
            blocks: self
                .blocks
                .iter()
                .map(|block| dto::Block {
                    x: block.position.x,
                    y: block.position.y,
                    z: block.position.z,
                    block_type_id: block.block_type_id.clone(),
                })
                .collect(),
        }
    }
}
