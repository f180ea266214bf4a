use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use voxelworld_lib::transfer::OperationStatus;

use crate::chunk::dirty::DirtyChunkTracker;
use crate::config::Settings;
use crate::err::WorldError;
use crate::ident::area::Area;
use crate::ident::chunk_key::ChunkKey;
use crate::ident::world_id::WorldId;
use crate::layer::compose::composite;
use crate::layer::store::LayerStore;
use crate::model::now_millis;
use crate::model::terrain::{ChunkData, TerrainChunk, CHUNK_DATA_TYPE};
use crate::storage::blob::{compress, decompress, BlobStore, StorageMeta};
use crate::storage::entity::EntityRepository;
use crate::storage::locks::{chunk_lock_key, KeyedLocks};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SweepResult {
    pub(crate) regenerated: u64,
    pub(crate) failed: u64,
    pub(crate) status: OperationStatus,
}

/// Merged terrain per chunk, stored as compressed blobs behind `TerrainChunk` records.
///
/// Reads and regeneration of one chunk take the same lock as layer writes to it. A read that finds
/// the chunk dirty rebuilds it before answering, so a stale composite is never served.
pub(crate) struct TerrainChunkCache {
    layers: Arc<LayerStore>,
    repo: Arc<EntityRepository>,
    blobs: Arc<dyn BlobStore>,
    tracker: Arc<DirtyChunkTracker>,
    chunk_locks: Arc<KeyedLocks>,
    settings: Arc<Settings>,
}

impl TerrainChunkCache {
    pub(crate) fn new(
        layers: Arc<LayerStore>,
        repo: Arc<EntityRepository>,
        blobs: Arc<dyn BlobStore>,
        tracker: Arc<DirtyChunkTracker>,
        chunk_locks: Arc<KeyedLocks>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            layers,
            repo,
            blobs,
            tracker,
            chunk_locks,
            settings,
        }
    }

    pub(crate) async fn get_chunk(&self, world_id: &str, chunk_key: &str) -> Result<ChunkData, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        let key = ChunkKey::parse(chunk_key)?;
        let _guard = self.lock(&world, key).await;
        if !self.tracker.is_dirty(&world, key) {
            if let Some(record) = self.record(&world, key).await? {
                match self.read_blob(&record).await {
                    Ok(data) => return Ok(data),
                    Err(WorldError::NotFound(_)) => {
                        warn!("Terrain blob of {world}/{key} is missing; regenerating");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        let (_, data) = self.regenerate_locked(&world, key).await?;
        Ok(data)
    }

    /// Rebuilds one chunk regardless of its state. `None` when no layer defines a block there.
    pub(crate) async fn regenerate(&self, world_id: &str, chunk_key: &str) -> Result<Option<TerrainChunk>, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        let key = ChunkKey::parse(chunk_key)?;
        let _guard = self.lock(&world, key).await;
        let (record, _) = self.regenerate_locked(&world, key).await?;
        Ok(record)
    }

    pub(crate) async fn terrain_record(&self, world_id: &str, chunk_key: &str) -> Result<Option<TerrainChunk>, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        self.record(&world, ChunkKey::parse(chunk_key)?).await
    }

    /// Regenerates every dirty chunk. Failed chunks stay dirty.
    pub(crate) async fn sweep(&self) -> SweepResult {
        let mut regenerated = 0;
        let mut failed = 0;
        for (world, key) in self.tracker.all_dirty() {
            match self.regenerate(&world, &key.to_string()).await {
                Ok(_) => regenerated += 1,
                Err(_) => failed += 1,
            }
        }
        if regenerated + failed > 0 {
            info!("Chunk sweep: {regenerated} regenerated, {failed} failed");
        }
        self.chunk_locks.prune();
        SweepResult {
            regenerated,
            failed,
            status: OperationStatus::classify(failed, failed > 0 && regenerated == 0),
        }
    }

    /// Rebuilds every chunk the area overlaps, dirty or not.
    pub(crate) async fn regenerate_area(&self, world_id: &str, area: &Area) -> Result<SweepResult, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        let keys = area.chunk_keys(self.layers.chunk_size(&world))?;
        debug!("Regenerating {} chunks of {world} covering {area}", keys.len());
        let mut regenerated = 0;
        let mut failed = 0;
        for key in keys {
            let _guard = self.lock(&world, key).await;
            match self.regenerate_locked(&world, key).await {
                Ok(_) => regenerated += 1,
                Err(_) => failed += 1,
            }
        }
        Ok(SweepResult {
            regenerated,
            failed,
            status: OperationStatus::classify(failed, failed > 0 && regenerated == 0),
        })
    }

    /// Drops every terrain record and blob of a world along with its dirty state.
    pub(crate) async fn invalidate_world(&self, world_id: &str) -> Result<u64, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        let records = self
            .repo
            .find_by_field::<TerrainChunk>("worldId", world.as_str())
            .await?;
        let mut removed = 0;
        for record in records {
            self.blobs.delete(&record.storage_id).await?;
            if self.repo.delete::<TerrainChunk>(&record.id).await? {
                removed += 1;
            }
        }
        self.tracker.clear_world(&world).await?;
        info!("Invalidated {removed} terrain chunks of world {world}");
        Ok(removed)
    }

    async fn lock(&self, world: &WorldId, key: ChunkKey) -> tokio::sync::OwnedMutexGuard<()> {
        self.chunk_locks
            .lock(&chunk_lock_key(world.as_str(), &key.to_string()))
            .await
    }

    async fn record(&self, world: &WorldId, key: ChunkKey) -> Result<Option<TerrainChunk>, WorldError> {
        self.repo
            .load::<TerrainChunk>(&TerrainChunk::document_id(world.as_str(), &key))
            .await
    }

    async fn read_blob(&self, record: &TerrainChunk) -> Result<ChunkData, WorldError> {
        let payload = self.blobs.load(&record.storage_id).await?;
        let plain = if record.compressed {
            decompress(&payload)?
        } else {
            payload
        };
        Ok(serde_json::from_slice(&plain)?)
    }

    /// Caller holds the chunk lock.
    async fn regenerate_locked(
        &self,
        world: &WorldId,
        key: ChunkKey,
    ) -> Result<(Option<TerrainChunk>, ChunkData), WorldError> {
        let generation = self.tracker.begin_regeneration(world, key);
        match self.rebuild(world, key).await {
            Ok(rebuilt) => {
                self.tracker.finish_regeneration(world, key, generation).await?;
                Ok(rebuilt)
            }
            Err(e) => {
                error!("Regeneration of chunk {world}/{key} failed: {e}");
                self.tracker.fail_regeneration(world, key, &e);
                Err(e)
            }
        }
    }

    /// An empty composite is not stored; a previous record and its blob are dropped instead.
    async fn rebuild(&self, world: &WorldId, key: ChunkKey) -> Result<(Option<TerrainChunk>, ChunkData), WorldError> {
        let sources = self.layers.load_sources(world, key).await?;
        let data = ChunkData {
            world_id: world.to_string(),
            chunk_key: key.to_string(),
            blocks: composite(&sources, key, self.layers.chunk_size(world)),
        };
        if data.blocks.is_empty() {
            if let Some(previous) = self.record(world, key).await? {
                self.repo.delete::<TerrainChunk>(&previous.id).await?;
                self.delete_blob(&previous.storage_id).await;
            }
            debug!("Chunk {world}/{key} is empty");
            return Ok((None, data));
        }
        let plain = serde_json::to_vec(&data)?;
        let compressed = compress(&plain, self.settings.compression_level)?;
        let meta = StorageMeta {
            entity_type: Some(CHUNK_DATA_TYPE.to_string()),
            schema: None,
            compressed: true,
        };
        let info = self.blobs.store(&compressed, meta).await?;

        let previous = self.record(world, key).await?;
        let record = TerrainChunk {
            id: TerrainChunk::document_id(world.as_str(), &key),
            world_id: world.to_string(),
            chunk_key: key.to_string(),
            storage_id: info.id.clone(),
            compressed: true,
            block_count: data.blocks.len() as u64,
            generated_at: now_millis(),
        };
        if let Err(e) = self.repo.save(&record).await {
            let _ = self.blobs.delete(&info.id).await;
            return Err(e);
        }
        if let Some(previous) = previous {
            self.delete_blob(&previous.storage_id).await;
        }
        debug!("Regenerated chunk {world}/{key} with {} blocks", record.block_count);
        Ok((Some(record), data))
    }

    async fn delete_blob(&self, storage_id: &str) {
        if let Err(e) = self.blobs.delete(storage_id).await {
            warn!("Could not delete replaced terrain blob {storage_id}: {e}");
        }
    }
}
