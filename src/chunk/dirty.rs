use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::err::WorldError;
use crate::ident::chunk_key::ChunkKey;
use crate::ident::world_id::WorldId;
use crate::model::dirty::DirtyChunk;
use crate::model::now_millis;
use crate::storage::entity::EntityRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ChunkStatus {
    Clean,
    Dirty,
    Regenerating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkState {
    pub(crate) status: ChunkStatus,
    /// Reason of the latest mark, kept for diagnostics.
    pub(crate) reason: Option<String>,
    pub(crate) marked_at: Option<u64>,
    /// Bumped by every mark. A regeneration only cleans the chunk if it is unchanged.
    pub(crate) generation: u64,
}

impl ChunkState {
    fn clean() -> Self {
        Self {
            status: ChunkStatus::Clean,
            reason: None,
            marked_at: None,
            generation: 0,
        }
    }
}

type ChunkId = (String, ChunkKey);

/// Clean -> Dirty -> Regenerating -> Clean state per (main world id, chunk key).
///
/// The in-memory state is authoritative for readers and holds entries only for chunks that
/// are not clean. Each dirty chunk also has one persisted `DirtyChunk` marker so a restarted
/// node picks up pending regenerations.
pub(crate) struct DirtyChunkTracker {
    repo: Arc<EntityRepository>,
    states: DashMap<ChunkId, ChunkState>,
}

impl DirtyChunkTracker {
    pub(crate) fn new(repo: Arc<EntityRepository>) -> Self {
        Self {
            repo,
            states: DashMap::new(),
        }
    }

    /// Idempotent: a dirty chunk stays dirty and only its reason and timestamp move.
    pub(crate) async fn mark_dirty(
        &self,
        world_id: &WorldId,
        chunk_key: ChunkKey,
        reason: &str,
    ) -> Result<(), WorldError> {
        let world = world_id.main_id().to_string();
        let timestamp = now_millis();
        {
            let mut state = self
                .states
                .entry((world.clone(), chunk_key))
                .or_insert_with(ChunkState::clean);
            state.status = ChunkStatus::Dirty;
            state.reason = Some(reason.to_string());
            state.marked_at = Some(timestamp);
            state.generation += 1;
        }
        let marker = DirtyChunk {
            id: DirtyChunk::document_id(&world, &chunk_key),
            world_id: world.clone(),
            chunk_key: chunk_key.to_string(),
            reason: reason.to_string(),
            timestamp,
        };
        self.repo.save(&marker).await?;
        debug!("Chunk {world}/{chunk_key} marked dirty: {reason}");
        Ok(())
    }

    pub(crate) fn chunk_state(&self, world_id: &WorldId, chunk_key: ChunkKey) -> Option<ChunkState> {
        self.states
            .get(&(world_id.main_id().to_string(), chunk_key))
            .map(|state| state.value().clone())
    }

    pub(crate) fn state(&self, world_id: &WorldId, chunk_key: ChunkKey) -> ChunkStatus {
        self.chunk_state(world_id, chunk_key)
            .map_or(ChunkStatus::Clean, |state| state.status)
    }

    pub(crate) fn is_dirty(&self, world_id: &WorldId, chunk_key: ChunkKey) -> bool {
        self.state(world_id, chunk_key) == ChunkStatus::Dirty
    }

    /// Moves the chunk to Regenerating and returns the generation the rebuild is based on.
    pub(crate) fn begin_regeneration(&self, world_id: &WorldId, chunk_key: ChunkKey) -> u64 {
        let mut state = self
            .states
            .entry((world_id.main_id().to_string(), chunk_key))
            .or_insert_with(ChunkState::clean);
        state.status = ChunkStatus::Regenerating;
        state.generation
    }

    /// Forgets the chunk and drops its marker, unless it was marked again after
    /// `begin_regeneration`. Returns whether the chunk is clean now.
    ///
    /// Clean chunks have no entry. Callers hold the chunk lock.
    pub(crate) async fn finish_regeneration(
        &self,
        world_id: &WorldId,
        chunk_key: ChunkKey,
        generation: u64,
    ) -> Result<bool, WorldError> {
        let world = world_id.main_id().to_string();
        let id = (world.clone(), chunk_key);
        let cleaned = match self.states.remove_if(&id, |_, state| state.generation == generation) {
            Some(_) => true,
            None => match self.states.get_mut(&id) {
                Some(mut state) => {
                    state.status = ChunkStatus::Dirty;
                    false
                }
                None => true,
            },
        };
        if cleaned {
            self.repo
                .delete::<DirtyChunk>(&DirtyChunk::document_id(&world, &chunk_key))
                .await?;
        } else {
            debug!("Chunk {world}/{chunk_key} was marked during regeneration; it stays dirty");
        }
        Ok(cleaned)
    }

    /// Puts the chunk back to Dirty so the next read or sweep retries.
    pub(crate) fn fail_regeneration(&self, world_id: &WorldId, chunk_key: ChunkKey, error: &WorldError) {
        let mut state = self
            .states
            .entry((world_id.main_id().to_string(), chunk_key))
            .or_insert_with(ChunkState::clean);
        state.status = ChunkStatus::Dirty;
        state.reason = Some(format!("regeneration failed: {error}"));
    }

    pub(crate) fn dirty_chunks(&self, world_id: &WorldId) -> Vec<ChunkKey> {
        let world = world_id.main_id().to_string();
        let mut keys: Vec<ChunkKey> = self
            .states
            .iter()
            .filter(|entry| entry.key().0 == world && entry.status == ChunkStatus::Dirty)
            .map(|entry| entry.key().1)
            .collect();
        keys.sort();
        keys
    }

    /// Dirty chunks of every world, sorted by world then key.
    pub(crate) fn all_dirty(&self) -> Vec<(String, ChunkKey)> {
        let mut chunks: Vec<(String, ChunkKey)> = self
            .states
            .iter()
            .filter(|entry| entry.status == ChunkStatus::Dirty)
            .map(|entry| entry.key().clone())
            .collect();
        chunks.sort();
        chunks
    }

    /// Loads persisted markers into the in-memory state. Called once at startup.
    pub(crate) async fn restore(&self) -> Result<usize, WorldError> {
        let markers = self.repo.find_all::<DirtyChunk>().await?;
        let mut restored = 0;
        for marker in markers {
            let Ok(chunk_key) = ChunkKey::parse(&marker.chunk_key) else {
                warn!("Ignoring dirty marker {} with invalid chunk key", marker.id);
                continue;
            };
            let mut state = self
                .states
                .entry((marker.world_id.clone(), chunk_key))
                .or_insert_with(ChunkState::clean);
            state.status = ChunkStatus::Dirty;
            state.reason = Some(marker.reason);
            state.marked_at = Some(marker.timestamp);
            state.generation += 1;
            restored += 1;
        }
        if restored > 0 {
            info!("Restored {restored} dirty chunk markers");
        }
        Ok(restored)
    }

    /// Forgets every chunk of a world and deletes its markers.
    pub(crate) async fn clear_world(&self, world_id: &WorldId) -> Result<u64, WorldError> {
        let world = world_id.main_id().to_string();
        self.states.retain(|(state_world, _), _| *state_world != world);
        self.repo.delete_by_field::<DirtyChunk>("worldId", &world).await
    }
}
