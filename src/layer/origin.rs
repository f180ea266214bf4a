use std::sync::Arc;

use voxelworld_lib::web::dto;

use crate::err::WorldError;
use crate::ident::chunk_key::ChunkKey;
use crate::ident::world_id::WorldId;
use crate::layer::compose::resolve_at;
use crate::layer::store::LayerStore;
use crate::model::block::{LayerBlock, Vector3i};
use crate::model::layer::Layer;
use crate::model::model::WorldModel;
use crate::model::terrain::TerrainChunk;
use crate::storage::entity::EntityRepository;

/// Which layer controls one block, with the model and cached terrain involved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BlockOrigin {
    /// Main world id.
    pub(crate) world_id: String,
    pub(crate) position: Vector3i,
    pub(crate) layer: Layer,
    pub(crate) layer_block: LayerBlock,
    pub(crate) terrain: Option<TerrainChunk>,
    pub(crate) model: Option<WorldModel>,
    pub(crate) group_name: Option<String>,
}

impl BlockOrigin {
    pub(crate) fn to_dto(&self) -> dto::BlockOrigin {
        dto::BlockOrigin {
            found: true,
            world_id: self.world_id.clone(),
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            layer: Some(self.layer.to_dto()),
            block_type_id: Some(self.layer_block.block.block_type_id.clone()),
            group: self.layer_block.group,
            group_name: self.group_name.clone(),
            model_name: self.model.as_ref().map(|model| model.name.clone()),
            mount: self.model.as_ref().map(|model| dto::Mount {
                x: model.mount_x,
                y: model.mount_y,
                z: model.mount_z,
            }),
            terrain_storage_id: self.terrain.as_ref().map(|terrain| terrain.storage_id.clone()),
        }
    }
}

/// Answer for a coordinate no layer defines.
pub(crate) fn not_found(world_id: &str, x: i32, y: i32, z: i32) -> dto::BlockOrigin {
    dto::BlockOrigin {
        found: false,
        world_id: world_id.to_string(),
        x,
        y,
        z,
        layer: None,
        block_type_id: None,
        group: None,
        group_name: None,
        model_name: None,
        mount: None,
        terrain_storage_id: None,
    }
}

pub(crate) struct BlockOriginResolver {
    layers: Arc<LayerStore>,
    repo: Arc<EntityRepository>,
}

impl BlockOriginResolver {
    pub(crate) fn new(layers: Arc<LayerStore>, repo: Arc<EntityRepository>) -> Self {
        Self { layers, repo }
    }

    /// `Ok(None)` means no enabled layer defines the coordinate, which is background rather
    /// than air. Only a malformed world id is an error.
    pub(crate) async fn find_block_origin(
        &self,
        world_id: &str,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<Option<BlockOrigin>, WorldError> {
        let world = WorldId::parse(world_id)?.main_id();
        let chunk_key = ChunkKey::from_world(x, z, self.layers.chunk_size(&world));
        let sources = self.layers.load_sources(&world, chunk_key).await?;
        let position = Vector3i::new(x, y, z);
        let Some(hit) = resolve_at(&sources, position) else {
            return Ok(None);
        };
        let terrain = self
            .repo
            .load::<TerrainChunk>(&TerrainChunk::document_id(world.as_str(), &chunk_key))
            .await?;
        let group_name = match (hit.model, hit.block.group) {
            (Some(model), Some(group)) => model.group_name(group).map(str::to_string),
            _ => None,
        };
        Ok(Some(BlockOrigin {
            world_id: world.to_string(),
            position,
            layer: hit.layer.clone(),
            layer_block: hit.block.clone(),
            terrain,
            model: hit.model.cloned(),
            group_name,
        }))
    }
}
