use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use voxelworld_derive::Entity;
use voxelworld_lib::web::dto;

use crate::err::WorldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum LayerType {
    /// Sparse per-chunk block data.
    Ground,
    /// Mounted block structures.
    Model,
}

impl LayerType {
    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        match value.trim().to_uppercase().as_str() {
            "GROUND" => Ok(LayerType::Ground),
            "MODEL" => Ok(LayerType::Model),
            _ => Err(WorldError::Validation(format!("unknown layer type '{value}'"))),
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            LayerType::Ground => "GROUND",
            LayerType::Model => "MODEL",
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(collection = "layers")]
#[serde(rename_all = "camelCase")]
pub(crate) struct Layer {
    #[serde(rename = "_id")]
    pub(crate) id: String,
    /// Always the main world id.
    pub(crate) world_id: String,
    pub(crate) name: String,
    pub(crate) layer_type: LayerType,
    pub(crate) order: i32,
    pub(crate) base_ground: bool,
    #[serde(default = "enabled_by_default")]
    pub(crate) enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) layer_data_id: String,
    /// Groups whose blocks take no part in resolution.
    #[serde(default)]
    pub(crate) hidden_groups: BTreeSet<i32>,
}

impl Layer {
    /// Composition order: ascending `order`, then name, then id.
    pub(crate) fn priority_cmp(&self, other: &Layer) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.id.cmp(&other.id))
    }

    pub(crate) fn shows_group(&self, group: Option<i32>) -> bool {
        group.map_or(true, |group| !self.hidden_groups.contains(&group))
    }

    /// Whether two versions of a layer would composite differently.
    pub(crate) fn composes_like(&self, other: &Layer) -> bool {
        self.order == other.order
            && self.enabled == other.enabled
            && self.name == other.name
            && self.hidden_groups == other.hidden_groups
    }

    pub(crate) fn to_dto(&self) -> dto::Layer {
        dto::Layer {
            id: self.id.clone(),
            name: self.name.clone(),
            layer_type: self.layer_type.as_str().to_string(),
            order: self.order,
            base_ground: self.base_ground,
            enabled: self.enabled,
            layer_data_id: self.layer_data_id.clone(),
        }
    }
}
