use std::collections::BTreeMap;

use crate::ident::chunk_key::ChunkKey;
use crate::model::block::{Block, LayerBlock, Vector3i};
use crate::model::chunk_data::LayerChunkData;
use crate::model::layer::Layer;
use crate::model::model::WorldModel;

/// What one layer contributes to one chunk.
#[derive(Debug, Clone)]
pub(crate) enum LayerSource {
    Ground(Option<LayerChunkData>),
    /// Models overlapping the chunk, lowest precedence first.
    Model(Vec<WorldModel>),
}

/// An enabled layer with its data for one chunk. Slices of these are expected in
/// composition order.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedLayer {
    pub(crate) layer: Layer,
    pub(crate) source: LayerSource,
}

/// The layer block that controls one coordinate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Hit<'a> {
    pub(crate) layer: &'a Layer,
    pub(crate) block: &'a LayerBlock,
    pub(crate) model: Option<&'a WorldModel>,
}

impl ResolvedLayer {
    pub(crate) fn block_at(&self, position: Vector3i) -> Option<Hit<'_>> {
        let hit = match &self.source {
            LayerSource::Ground(data) => data.as_ref()?.block_at(position).map(|block| Hit {
                layer: &self.layer,
                block,
                model: None,
            }),
            LayerSource::Model(models) => models.iter().rev().find_map(|model| {
                model
                    .block_at_world(position)
                    .filter(|block| self.layer.shows_group(block.group))
                    .map(|block| Hit {
                        layer: &self.layer,
                        block,
                        model: Some(model),
                    })
            }),
        }?;
        self.layer.shows_group(hit.block.group).then_some(hit)
    }

    /// Every visible block this layer defines, in world coordinates, in write order.
    fn blocks(&self) -> Vec<(Vector3i, &LayerBlock)> {
        let blocks: Vec<(Vector3i, &LayerBlock)> = match &self.source {
            LayerSource::Ground(None) => vec![],
            LayerSource::Ground(Some(data)) => data
                .blocks
                .iter()
                .map(|block| (block.position(), block))
                .collect(),
            LayerSource::Model(models) => models.iter().flat_map(WorldModel::world_blocks).collect(),
        };
        blocks
            .into_iter()
            .filter(|(_, block)| self.layer.shows_group(block.group))
            .collect()
    }
}

/// Walks the layers in order and keeps the last one defining the coordinate.
pub(crate) fn resolve_at(layers: &[ResolvedLayer], position: Vector3i) -> Option<Hit<'_>> {
    layers
        .iter()
        .filter_map(|layer| layer.block_at(position))
        .last()
}

/// Merged view of one chunk: the same last-writer-wins rule as `resolve_at`, applied to every
/// position any layer touches inside the chunk. Air overrides are applied, then dropped.
pub(crate) fn composite(layers: &[ResolvedLayer], chunk_key: ChunkKey, chunk_size: i32) -> Vec<Block> {
    let mut merged: BTreeMap<Vector3i, &LayerBlock> = BTreeMap::new();
    for layer in layers {
        for (position, block) in layer.blocks() {
            if chunk_key.contains(position.x, position.z, chunk_size) {
                merged.insert(position, block);
            }
        }
    }
    merged
        .into_iter()
        .filter(|(_, block)| !block.block.is_air())
        .map(|(position, block)| Block {
            position,
            ..block.block.clone()
        })
        .collect()
}
