use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info};
use uuid::Uuid;
use voxelworld_lib::web::dto;

use crate::chunk::dirty::DirtyChunkTracker;
use crate::config::Settings;
use crate::err::WorldError;
use crate::ident::area::Area;
use crate::ident::chunk_key::ChunkKey;
use crate::ident::world_id::WorldId;
use crate::layer::compose::{LayerSource, ResolvedLayer};
use crate::model::block::{LayerBlock, Vector3i};
use crate::model::chunk_data::LayerChunkData;
use crate::model::layer::{Layer, LayerType};
use crate::model::model::WorldModel;
use crate::storage::entity::EntityRepository;
use crate::storage::locks::{chunk_lock_key, KeyedLocks};

const WORLD_FIELD: &str = "worldId";
const LAYER_DATA_FIELD: &str = "layerDataId";

/// Parameters of `LayerStore::create_layer`.
#[derive(Debug, Clone)]
pub(crate) struct NewLayer {
    pub(crate) name: String,
    pub(crate) layer_type: LayerType,
    pub(crate) order: i32,
    pub(crate) base_ground: bool,
    pub(crate) description: Option<String>,
    pub(crate) enabled: bool,
}

impl NewLayer {
    pub(crate) fn from_dto(request: dto::CreateLayer) -> Result<Self, WorldError> {
        Ok(Self {
            name: request.name,
            layer_type: LayerType::parse(&request.layer_type)?,
            order: request.order,
            base_ground: request.base_ground,
            description: request.description,
            enabled: request.enabled,
        })
    }
}

/// Counts of `LayerStore::clear_area`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ClearedBlocks {
    pub(crate) blocks: u64,
    pub(crate) chunks: u64,
}

/// Counts removed by `LayerStore::delete_world_resources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct DeletedResources {
    pub(crate) layers: u64,
    pub(crate) chunks: u64,
    pub(crate) models: u64,
}

/// Layers and their block data, keyed by main world id.
///
/// Every write that can change a chunk's composite takes that chunk's lock, writes and marks
/// the chunk dirty before releasing it.
pub(crate) struct LayerStore {
    repo: Arc<EntityRepository>,
    settings: Arc<Settings>,
    tracker: Arc<DirtyChunkTracker>,
    chunk_locks: Arc<KeyedLocks>,
    world_locks: KeyedLocks,
}

impl LayerStore {
    pub(crate) fn new(
        repo: Arc<EntityRepository>,
        settings: Arc<Settings>,
        tracker: Arc<DirtyChunkTracker>,
        chunk_locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            repo,
            settings,
            tracker,
            chunk_locks,
            world_locks: KeyedLocks::new(),
        }
    }

    pub(crate) fn chunk_size(&self, world: &WorldId) -> i32 {
        self.settings.chunk_size_for(world)
    }

    /// Fails with `Conflict` when the main world already has a layer of that name.
    pub(crate) async fn create_layer(&self, world_id: &str, new: NewLayer) -> Result<Layer, WorldError> {
        let world = main_world(world_id)?;
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(WorldError::Validation("layer name must not be empty".into()));
        }
        let _guard = self.world_locks.lock(world.as_str()).await;
        if self.layers_of(&world).await?.iter().any(|layer| layer.name == name) {
            return Err(WorldError::Conflict(format!(
                "layer '{name}' already exists in world {world}"
            )));
        }
        let layer = Layer {
            id: Uuid::new_v4().to_string(),
            world_id: world.to_string(),
            name,
            layer_type: new.layer_type,
            order: new.order,
            base_ground: new.base_ground,
            enabled: new.enabled,
            description: new.description,
            layer_data_id: Uuid::new_v4().simple().to_string(),
            hidden_groups: BTreeSet::new(),
        };
        self.repo.insert(&layer).await?;
        info!("Created {} layer '{}' in world {world}", layer.layer_type.as_str(), layer.name);
        Ok(layer)
    }

    /// Layers of the main world in composition order, disabled ones included.
    pub(crate) async fn find_by_world_id(&self, world_id: &str) -> Result<Vec<Layer>, WorldError> {
        self.layers_of(&main_world(world_id)?).await
    }

    pub(crate) async fn find_layer(&self, world_id: &str, name: &str) -> Result<Option<Layer>, WorldError> {
        Ok(self
            .find_by_world_id(world_id)
            .await?
            .into_iter()
            .find(|layer| layer.name == name))
    }

    /// Read-modify-write of one layer. Identity fields (`id`, `worldId`, `layerDataId`,
    /// `layerType`) can not be changed. Returns `None` when the layer does not exist.
    pub(crate) async fn update<F>(&self, world_id: &str, layer_id: &str, mutator: F) -> Result<Option<Layer>, WorldError>
    where
        F: FnOnce(&mut Layer) + Send + 'static,
    {
        let world = main_world(world_id)?;
        let _guard = self.world_locks.lock(world.as_str()).await;
        let layers = self.layers_of(&world).await?;
        let Some(before) = layers.iter().find(|layer| layer.id == layer_id).cloned() else {
            return Ok(None);
        };
        let taken: Vec<String> = layers
            .iter()
            .filter(|layer| layer.id != layer_id)
            .map(|layer| layer.name.clone())
            .collect();
        let identity = before.clone();
        let updated = self
            .repo
            .modify::<Layer, _>(layer_id, move |layer| {
                mutator(layer);
                layer.id = identity.id;
                layer.world_id = identity.world_id;
                layer.layer_data_id = identity.layer_data_id;
                layer.layer_type = identity.layer_type;
                layer.name = layer.name.trim().to_string();
                if layer.name.is_empty() {
                    return Err(WorldError::Validation("layer name must not be empty".into()));
                }
                if taken.contains(&layer.name) {
                    return Err(WorldError::Conflict(format!("layer name '{}' is taken", layer.name)));
                }
                Ok(())
            })
            .await?;
        let Some(updated) = updated else {
            return Ok(None);
        };
        if !updated.composes_like(&before) {
            let keys = self.contributed_chunks(&world, &updated).await?;
            self.mark_chunks(&world, &keys, &format!("layer '{}' updated", updated.name))
                .await?;
        }
        Ok(Some(updated))
    }

    /// Replaces the blocks a ground layer defines in one chunk and marks the chunk dirty.
    /// An empty block list removes the chunk data.
    pub(crate) async fn save_terrain_chunk(
        &self,
        world_id: &str,
        layer_data_id: &str,
        chunk_key: &str,
        data: LayerChunkData,
    ) -> Result<(), WorldError> {
        let world = main_world(world_id)?;
        let key = ChunkKey::parse(chunk_key)?;
        let layer = self.ground_layer_by_data(&world, layer_data_id).await?;
        let mut blocks = data.blocks;
        for block in &mut blocks {
            block.normalize()?;
        }
        let data = LayerChunkData::new(world.as_str(), layer_data_id, key, blocks);
        data.validate(self.chunk_size(&world))?;

        let _guard = self
            .chunk_locks
            .lock(&chunk_lock_key(world.as_str(), &key.to_string()))
            .await;
        if data.blocks.is_empty() {
            self.repo.delete::<LayerChunkData>(&data.id).await?;
        } else {
            self.repo.save(&data).await?;
        }
        debug!("Saved {} blocks of layer '{}' in chunk {world}/{key}", data.blocks.len(), layer.name);
        self.tracker
            .mark_dirty(&world, key, &format!("layer '{}' chunk saved", layer.name))
            .await
    }

    pub(crate) async fn load_terrain_chunk(
        &self,
        world_id: &str,
        layer_data_id: &str,
        chunk_key: &str,
    ) -> Result<Option<LayerChunkData>, WorldError> {
        let world = main_world(world_id)?;
        let key = ChunkKey::parse(chunk_key)?;
        let data = self
            .repo
            .load::<LayerChunkData>(&LayerChunkData::document_id(layer_data_id, &key))
            .await?;
        Ok(data.filter(|data| data.world_id == world.as_str()))
    }

    /// Writes a single block into a ground layer. Air is stored as an explicit override.
    pub(crate) async fn set_block(&self, world_id: &str, layer_id: &str, mut block: LayerBlock) -> Result<(), WorldError> {
        let world = main_world(world_id)?;
        block.normalize()?;
        let layer = self.layer(&world, layer_id).await?;
        if layer.layer_type != LayerType::Ground {
            return Err(WorldError::Validation(format!(
                "layer '{}' is not a ground layer",
                layer.name
            )));
        }
        let position = block.position();
        let key = ChunkKey::from_world(position.x, position.z, self.chunk_size(&world));

        let _guard = self
            .chunk_locks
            .lock(&chunk_lock_key(world.as_str(), &key.to_string()))
            .await;
        let id = LayerChunkData::document_id(&layer.layer_data_id, &key);
        let mut data = match self.repo.load::<LayerChunkData>(&id).await? {
            Some(data) => data,
            None => LayerChunkData::new(world.as_str(), &layer.layer_data_id, key, vec![]),
        };
        data.set_block(block);
        self.repo.save(&data).await?;
        self.tracker
            .mark_dirty(&world, key, &format!("block set in layer '{}'", layer.name))
            .await
    }

    /// Removes every block a ground layer defines inside `area`, air overrides included, so
    /// lower layers show through again. Chunks that lost blocks are marked dirty.
    pub(crate) async fn clear_area(&self, world_id: &str, layer_id: &str, area: &Area) -> Result<ClearedBlocks, WorldError> {
        let world = main_world(world_id)?;
        let layer = self.layer(&world, layer_id).await?;
        if layer.layer_type != LayerType::Ground {
            return Err(WorldError::Validation(format!(
                "layer '{}' is not a ground layer",
                layer.name
            )));
        }
        let mut cleared = ClearedBlocks::default();
        for key in area.chunk_keys(self.chunk_size(&world))? {
            let _guard = self
                .chunk_locks
                .lock(&chunk_lock_key(world.as_str(), &key.to_string()))
                .await;
            let id = LayerChunkData::document_id(&layer.layer_data_id, &key);
            let Some(mut data) = self.repo.load::<LayerChunkData>(&id).await? else {
                continue;
            };
            let inside: Vec<Vector3i> = data
                .blocks
                .iter()
                .map(LayerBlock::position)
                .filter(|p| area.contains(p.x, p.y, p.z))
                .collect();
            if inside.is_empty() {
                continue;
            }
            for position in inside {
                if data.remove_block(position) {
                    cleared.blocks += 1;
                }
            }
            if data.blocks.is_empty() {
                self.repo.delete::<LayerChunkData>(&id).await?;
            } else {
                self.repo.save(&data).await?;
            }
            cleared.chunks += 1;
            self.tracker
                .mark_dirty(&world, key, &format!("area {area} cleared in layer '{}'", layer.name))
                .await?;
        }
        info!(
            "Cleared {} blocks in {} chunks of layer '{}' in {world}",
            cleared.blocks, cleared.chunks, layer.name
        );
        Ok(cleared)
    }

    /// Creates or replaces a model of a MODEL layer. Chunks covered by the previous and the
    /// new content are marked dirty.
    pub(crate) async fn save_model(
        &self,
        world_id: &str,
        layer_id: &str,
        mut model: WorldModel,
    ) -> Result<WorldModel, WorldError> {
        let world = main_world(world_id)?;
        let layer = self.layer(&world, layer_id).await?;
        if layer.layer_type != LayerType::Model {
            return Err(WorldError::Validation(format!(
                "layer '{}' is not a model layer",
                layer.name
            )));
        }
        if model.id.is_empty() {
            model.id = Uuid::new_v4().to_string();
        }
        model.world_id = world.to_string();
        model.layer_data_id = layer.layer_data_id.clone();
        model.validate()?;
        for block in &mut model.content {
            block.normalize()?;
        }

        let size = self.chunk_size(&world);
        let mut keys = model.chunk_keys(size);
        if let Some(previous) = self.repo.load::<WorldModel>(&model.id).await? {
            if previous.layer_data_id != model.layer_data_id {
                return Err(WorldError::Conflict(format!(
                    "model '{}' belongs to another layer",
                    model.id
                )));
            }
            keys.extend(previous.chunk_keys(size));
        }
        let _guards = self.lock_chunks(&world, &keys).await;
        self.repo.save(&model).await?;
        self.mark_chunks(&world, &keys, &format!("model '{}' saved", model.name))
            .await?;
        Ok(model)
    }

    /// Models of one layer in precedence order.
    pub(crate) async fn find_models(&self, world_id: &str, layer_data_id: &str) -> Result<Vec<WorldModel>, WorldError> {
        let world = main_world(world_id)?;
        self.models_of(&world, layer_data_id).await
    }

    pub(crate) async fn delete_model(&self, world_id: &str, model_id: &str) -> Result<bool, WorldError> {
        let world = main_world(world_id)?;
        let Some(model) = self.repo.load::<WorldModel>(model_id).await? else {
            return Ok(false);
        };
        if model.world_id != world.as_str() {
            return Ok(false);
        }
        let keys = model.chunk_keys(self.chunk_size(&world));
        let _guards = self.lock_chunks(&world, &keys).await;
        let deleted = self.repo.delete::<WorldModel>(model_id).await?;
        self.mark_chunks(&world, &keys, &format!("model '{}' deleted", model.name))
            .await?;
        Ok(deleted)
    }

    /// Removes a layer with its chunk data and models. Every chunk it contributed to is
    /// marked dirty.
    pub(crate) async fn delete(&self, world_id: &str, layer_id: &str) -> Result<bool, WorldError> {
        let world = main_world(world_id)?;
        let _world_guard = self.world_locks.lock(world.as_str()).await;
        let Some(layer) = self.repo.load::<Layer>(layer_id).await? else {
            return Ok(false);
        };
        if layer.world_id != world.as_str() {
            return Ok(false);
        }
        let keys = self.contributed_chunks(&world, &layer).await?;
        let _guards = self.lock_chunks(&world, &keys).await;
        self.repo
            .delete_by_field::<LayerChunkData>(LAYER_DATA_FIELD, &layer.layer_data_id)
            .await?;
        self.repo
            .delete_by_field::<WorldModel>(LAYER_DATA_FIELD, &layer.layer_data_id)
            .await?;
        self.repo.delete::<Layer>(layer_id).await?;
        self.mark_chunks(&world, &keys, &format!("layer '{}' deleted", layer.name))
            .await?;
        info!("Deleted layer '{}' of world {world}", layer.name);
        Ok(true)
    }

    /// Drops all layer data of a world. Only called once the world itself is
    /// gone, so no chunk is marked dirty.
    pub(crate) async fn delete_world_resources(&self, world_id: &str) -> Result<DeletedResources, WorldError> {
        let world = main_world(world_id)?;
        let _guard = self.world_locks.lock(world.as_str()).await;
        let deleted = DeletedResources {
            chunks: self
                .repo
                .delete_by_field::<LayerChunkData>(WORLD_FIELD, world.as_str())
                .await?,
            models: self
                .repo
                .delete_by_field::<WorldModel>(WORLD_FIELD, world.as_str())
                .await?,
            layers: self
                .repo
                .delete_by_field::<Layer>(WORLD_FIELD, world.as_str())
                .await?,
        };
        info!(
            "Deleted resources of world {world}: {} layers, {} chunks, {} models",
            deleted.layers, deleted.chunks, deleted.models
        );
        Ok(deleted)
    }

    /// Enabled layers of a main world with their data for one chunk, in composition order.
    pub(crate) async fn load_sources(&self, world: &WorldId, chunk_key: ChunkKey) -> Result<Vec<ResolvedLayer>, WorldError> {
        let size = self.chunk_size(world);
        let mut sources = Vec::new();
        for layer in self.layers_of(world).await? {
            if !layer.enabled {
                continue;
            }
            let source = match layer.layer_type {
                LayerType::Ground => LayerSource::Ground(
                    self.repo
                        .load::<LayerChunkData>(&LayerChunkData::document_id(&layer.layer_data_id, &chunk_key))
                        .await?,
                ),
                LayerType::Model => LayerSource::Model(
                    self.models_of(world, &layer.layer_data_id)
                        .await?
                        .into_iter()
                        .filter(|model| model.chunk_keys(size).contains(&chunk_key))
                        .collect(),
                ),
            };
            sources.push(ResolvedLayer { layer, source });
        }
        Ok(sources)
    }

    async fn layers_of(&self, world: &WorldId) -> Result<Vec<Layer>, WorldError> {
        let mut layers = self.repo.find_by_field::<Layer>(WORLD_FIELD, world.as_str()).await?;
        layers.sort_by(Layer::priority_cmp);
        Ok(layers)
    }

    async fn layer(&self, world: &WorldId, layer_id: &str) -> Result<Layer, WorldError> {
        self.repo
            .load::<Layer>(layer_id)
            .await?
            .filter(|layer| layer.world_id == world.as_str())
            .ok_or_else(|| WorldError::NotFound(format!("layer '{layer_id}' in world {world}")))
    }

    async fn ground_layer_by_data(&self, world: &WorldId, layer_data_id: &str) -> Result<Layer, WorldError> {
        let layer = self
            .layers_of(world)
            .await?
            .into_iter()
            .find(|layer| layer.layer_data_id == layer_data_id)
            .ok_or_else(|| WorldError::NotFound(format!("layer data '{layer_data_id}' in world {world}")))?;
        if layer.layer_type != LayerType::Ground {
            return Err(WorldError::Validation(format!(
                "layer '{}' is not a ground layer",
                layer.name
            )));
        }
        Ok(layer)
    }

    async fn models_of(&self, world: &WorldId, layer_data_id: &str) -> Result<Vec<WorldModel>, WorldError> {
        let mut models: Vec<WorldModel> = self
            .repo
            .find_by_field::<WorldModel>(LAYER_DATA_FIELD, layer_data_id)
            .await?
            .into_iter()
            .filter(|model| model.world_id == world.as_str())
            .collect();
        models.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(models)
    }

    /// Chunks in which the layer currently defines blocks.
    async fn contributed_chunks(&self, world: &WorldId, layer: &Layer) -> Result<BTreeSet<ChunkKey>, WorldError> {
        match layer.layer_type {
            LayerType::Ground => self
                .repo
                .find_by_field::<LayerChunkData>(LAYER_DATA_FIELD, &layer.layer_data_id)
                .await?
                .iter()
                .map(LayerChunkData::key)
                .collect(),
            LayerType::Model => {
                let size = self.chunk_size(world);
                Ok(self
                    .models_of(world, &layer.layer_data_id)
                    .await?
                    .iter()
                    .flat_map(|model| model.chunk_keys(size))
                    .collect())
            }
        }
    }

    async fn lock_chunks(&self, world: &WorldId, keys: &BTreeSet<ChunkKey>) -> Vec<tokio::sync::OwnedMutexGuard<()>> {
        let lock_keys: Vec<String> = keys
            .iter()
            .map(|key| chunk_lock_key(world.as_str(), &key.to_string()))
            .collect();
        self.chunk_locks.lock_all(&lock_keys).await
    }

    async fn mark_chunks(&self, world: &WorldId, keys: &BTreeSet<ChunkKey>, reason: &str) -> Result<(), WorldError> {
        for key in keys {
            self.tracker.mark_dirty(world, *key, reason).await?;
        }
        Ok(())
    }
}

fn main_world(world_id: &str) -> Result<WorldId, WorldError> {
    Ok(WorldId::parse(world_id)?.main_id())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::dirty::ChunkStatus;
    use crate::model::block::Block;
    use crate::test_util::repository;

    fn store() -> LayerStore {
        let repo = repository();
        let tracker = Arc::new(DirtyChunkTracker::new(repo.clone()));
        LayerStore::new(
            repo,
            Arc::new(Settings::default()),
            tracker,
            Arc::new(KeyedLocks::new()),
        )
    }

    fn new_layer(name: &str, layer_type: LayerType, order: i32) -> NewLayer {
        NewLayer {
            name: name.into(),
            layer_type,
            order,
            base_ground: layer_type == LayerType::Ground,
            description: None,
            enabled: true,
        }
    }

    fn chunk(blocks: Vec<(i32, i32, i32, &str)>) -> LayerChunkData {
        LayerChunkData {
            id: String::new(),
            world_id: String::new(),
            layer_data_id: String::new(),
            chunk_key: String::new(),
            blocks: blocks
                .into_iter()
                .map(|(x, y, z, id)| LayerBlock::new(Block::new(x, y, z, id)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn duplicate_names_conflict_per_main_world() {
        let store = store();
        store
            .create_layer("r1:earth!s1", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_layer("r1:earth!s2", new_layer("ground", LayerType::Ground, 20))
                .await,
            Err(WorldError::Conflict(_))
        ));
        store
            .create_layer("r1:mars", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        let layers = store.find_by_world_id("r1:earth").await.unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].world_id, "r1:earth");
        assert!(matches!(
            store.create_layer("bad id!", new_layer("x", LayerType::Ground, 1)).await,
            Err(WorldError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn save_chunk_normalizes_and_marks_dirty() {
        let store = store();
        let layer = store
            .create_layer("r1:earth:zone1!sess42", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        store
            .save_terrain_chunk(
                "r1:earth:zone1!sess42",
                &layer.layer_data_id,
                "0:0",
                chunk(vec![(5, 65, 5, "n/stone")]),
            )
            .await
            .unwrap();
        let world = WorldId::parse("r1:earth:zone1").unwrap();
        assert_eq!(store.tracker.state(&world, ChunkKey::new(0, 0)), ChunkStatus::Dirty);
        let loaded = store
            .load_terrain_chunk("r1:earth:zone1", &layer.layer_data_id, "0:0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.world_id, "r1:earth:zone1");
        assert_eq!(loaded.blocks.len(), 1);

        assert!(matches!(
            store
                .save_terrain_chunk("r1:earth:zone1", &layer.layer_data_id, "0:0", chunk(vec![(40, 0, 0, "n/stone")]))
                .await,
            Err(WorldError::Validation(_))
        ));
        assert!(matches!(
            store
                .save_terrain_chunk("r1:earth:zone1", "unknown", "0:0", chunk(vec![]))
                .await,
            Err(WorldError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_keeps_identity_and_checks_names() {
        let store = store();
        let ground = store
            .create_layer("w1", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        store
            .create_layer("w1", new_layer("flora", LayerType::Ground, 30))
            .await
            .unwrap();
        store
            .set_block("w1", &ground.id, LayerBlock::new(Block::new(40, 1, 1, "n/stone")))
            .await
            .unwrap();
        let world = WorldId::parse("w1").unwrap();
        store.tracker.begin_regeneration(&world, ChunkKey::new(1, 0));
        store
            .tracker
            .finish_regeneration(&world, ChunkKey::new(1, 0), 1)
            .await
            .unwrap();

        let updated = store
            .update("w1", &ground.id, |layer| {
                layer.order = 50;
                layer.id = "hijacked".into();
                layer.layer_type = LayerType::Model;
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.order, 50);
        assert_eq!(updated.id, ground.id);
        assert_eq!(updated.layer_type, LayerType::Ground);
        assert!(store.tracker.is_dirty(&world, ChunkKey::new(1, 0)));

        assert!(matches!(
            store
                .update("w1", &ground.id, |layer| layer.name = "flora".into())
                .await,
            Err(WorldError::Conflict(_))
        ));
        assert!(store.update("w1", "missing", |_| {}).await.unwrap().is_none());
        let names: Vec<String> = store
            .find_by_world_id("w1")
            .await
            .unwrap()
            .into_iter()
            .map(|layer| layer.name)
            .collect();
        assert_eq!(names, vec!["flora", "ground"]);
    }

    #[tokio::test]
    async fn models_and_delete_mark_covered_chunks() {
        let store = store();
        let layer = store
            .create_layer("w1", new_layer("houses", LayerType::Model, 20))
            .await
            .unwrap();
        let model = WorldModel {
            id: String::new(),
            world_id: String::new(),
            layer_data_id: String::new(),
            name: "hut".into(),
            title: None,
            mount_x: 31,
            mount_y: 64,
            mount_z: 0,
            order: 0,
            groups: Default::default(),
            content: vec![
                LayerBlock::new(Block::new(0, 0, 0, "n/planks")),
                LayerBlock::new(Block::new(1, 0, 0, "n/planks")),
            ],
        };
        let saved = store.save_model("w1", &layer.id, model).await.unwrap();
        assert!(!saved.id.is_empty());
        assert_eq!(saved.layer_data_id, layer.layer_data_id);
        let world = WorldId::parse("w1").unwrap();
        assert_eq!(
            store.tracker.dirty_chunks(&world),
            vec![ChunkKey::new(0, 0), ChunkKey::new(1, 0)]
        );
        assert_eq!(store.find_models("w1", &layer.layer_data_id).await.unwrap().len(), 1);
        assert!(matches!(
            store
                .set_block("w1", &layer.id, LayerBlock::new(Block::new(0, 0, 0, "n/stone")))
                .await,
            Err(WorldError::Validation(_))
        ));

        store.tracker.clear_world(&world).await.unwrap();
        assert!(store.delete("w1", &layer.id).await.unwrap());
        assert_eq!(store.tracker.dirty_chunks(&world).len(), 2);
        assert!(store.find_models("w1", &layer.layer_data_id).await.unwrap().is_empty());
        assert!(!store.delete("w1", &layer.id).await.unwrap());
    }

    #[tokio::test]
    async fn block_ids_are_stored_normalized() {
        let store = store();
        let ground = store
            .create_layer("w1", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        store
            .set_block("w1", &ground.id, LayerBlock::new(Block::new(1, 1, 1, "N/Grass")))
            .await
            .unwrap();
        store
            .set_block("w1", &ground.id, LayerBlock::new(Block::new(2, 1, 1, " Stone ")))
            .await
            .unwrap();
        store
            .set_block("w1", &ground.id, LayerBlock::new(Block::new(3, 1, 1, "AIR")))
            .await
            .unwrap();
        let data = store
            .load_terrain_chunk("w1", &ground.layer_data_id, "0:0")
            .await
            .unwrap()
            .unwrap();
        let ids: Vec<&str> = data.blocks.iter().map(|b| b.block.block_type_id.as_str()).collect();
        assert_eq!(ids, vec!["n/grass", "w/stone", ""]);

        store
            .save_terrain_chunk("w1", &ground.layer_data_id, "1:0", chunk(vec![(33, 1, 1, "N/Dirt")]))
            .await
            .unwrap();
        let saved = store
            .load_terrain_chunk("w1", &ground.layer_data_id, "1:0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.blocks[0].block.block_type_id, "n/dirt");

        let houses = store
            .create_layer("w1", new_layer("houses", LayerType::Model, 20))
            .await
            .unwrap();
        let model = WorldModel {
            id: String::new(),
            world_id: String::new(),
            layer_data_id: String::new(),
            name: "hut".into(),
            title: None,
            mount_x: 0,
            mount_y: 64,
            mount_z: 0,
            order: 0,
            groups: Default::default(),
            content: vec![LayerBlock::new(Block::new(0, 0, 0, "Planks"))],
        };
        let saved = store.save_model("w1", &houses.id, model).await.unwrap();
        assert_eq!(saved.content[0].block.block_type_id, "w/planks");
        let stored = store.find_models("w1", &houses.layer_data_id).await.unwrap();
        assert_eq!(stored[0].content[0].block.block_type_id, "w/planks");

        assert!(matches!(
            store
                .set_block("w1", &ground.id, LayerBlock::new(Block::new(4, 1, 1, "red stone")))
                .await,
            Err(WorldError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn clearing_an_area_removes_only_blocks_inside() {
        let store = store();
        let ground = store
            .create_layer("w1", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        for (x, id) in [(30, "n/stone"), (31, "air"), (33, "n/dirt"), (34, "n/dirt"), (70, "n/sand")] {
            store
                .set_block("w1", &ground.id, LayerBlock::new(Block::new(x, 64, 0, id)))
                .await
                .unwrap();
        }
        let world = WorldId::parse("w1").unwrap();
        store.tracker.clear_world(&world).await.unwrap();

        let area = Area::parse("30,64,0,4,1,1").unwrap();
        let cleared = store.clear_area("w1!s1", &ground.id, &area).await.unwrap();
        assert_eq!(cleared, ClearedBlocks { blocks: 3, chunks: 2 });
        assert!(store
            .load_terrain_chunk("w1", &ground.layer_data_id, "0:0")
            .await
            .unwrap()
            .is_none());
        let rest = store
            .load_terrain_chunk("w1", &ground.layer_data_id, "1:0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rest.blocks.len(), 1);
        assert_eq!(rest.blocks[0].position(), Vector3i::new(34, 64, 0));
        assert_eq!(
            store.tracker.dirty_chunks(&world),
            vec![ChunkKey::new(0, 0), ChunkKey::new(1, 0)]
        );

        let again = store.clear_area("w1", &ground.id, &area).await.unwrap();
        assert_eq!(again, ClearedBlocks::default());

        let houses = store
            .create_layer("w1", new_layer("houses", LayerType::Model, 20))
            .await
            .unwrap();
        assert!(matches!(
            store.clear_area("w1", &houses.id, &area).await,
            Err(WorldError::Validation(_))
        ));
        assert!(matches!(
            store
                .clear_area("w1", &ground.id, &Area::parse("0,0,0,2000000000,1,2000000000").unwrap())
                .await,
            Err(WorldError::Validation(_))
        ));
    }

    #[test]
    fn layer_requests_parse_their_type() {
        let request = dto::CreateLayer {
            name: "houses".into(),
            layer_type: "model".into(),
            order: 20,
            base_ground: false,
            description: None,
            enabled: true,
        };
        assert_eq!(NewLayer::from_dto(request.clone()).unwrap().layer_type, LayerType::Model);
        let unknown = dto::CreateLayer {
            layer_type: "flora".into(),
            ..request
        };
        assert!(matches!(NewLayer::from_dto(unknown), Err(WorldError::Validation(_))));
    }

    #[tokio::test]
    async fn world_cleanup_removes_everything() {
        let store = store();
        let ground = store
            .create_layer("w1", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        store
            .set_block("w1", &ground.id, LayerBlock::new(Block::new(1, 1, 1, "n/stone")))
            .await
            .unwrap();
        store
            .create_layer("w2", new_layer("ground", LayerType::Ground, 10))
            .await
            .unwrap();
        let deleted = store.delete_world_resources("w1!anything").await.unwrap();
        assert_eq!(deleted, DeletedResources { layers: 1, chunks: 1, models: 0 });
        assert!(store.find_by_world_id("w1").await.unwrap().is_empty());
        assert_eq!(store.find_by_world_id("w2").await.unwrap().len(), 1);
    }
}
