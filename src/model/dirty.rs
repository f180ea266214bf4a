use serde::{Deserialize, Serialize};
use voxelworld_derive::Entity;

use crate::ident::chunk_key::ChunkKey;

/// Persisted marker for a chunk whose terrain record is stale. One per chunk; repeated
/// marks overwrite reason and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Entity)]
#[entity(collection = "dirty_chunks")]
#[serde(rename_all = "camelCase")]
pub(crate) struct DirtyChunk {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    pub(crate) world_id: String,
    pub(crate) chunk_key: String,
    pub(crate) reason: String,
    pub(crate) timestamp: u64,
}

impl DirtyChunk {
    pub(crate) fn document_id(main_world_id: &str, chunk_key: &ChunkKey) -> String {
        format!("{main_world_id}/{chunk_key}")
    }
}
