use serde::{Deserialize, Serialize};

use crate::transfer::ImportMode;

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub layer_type: String,
    pub order: i32,
    pub base_ground: bool,
    pub enabled: bool,
    pub layer_data_id: String,
}

/// Request body for creating a layer. `layerType` is `GROUND` or `MODEL`, case-insensitive.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateLayer {
    pub name: String,
    pub layer_type: String,
    pub order: i32,
    #[serde(default)]
    pub base_ground: bool,
    pub description: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClearedArea {
    pub layer_id: String,
    pub area: String,
    pub removed_blocks: u64,
    pub chunks: u64,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BlockOrigin {
    pub found: bool,
    pub world_id: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub layer: Option<Layer>,
    pub block_type_id: Option<String>,
    pub group: Option<i32>,
    pub group_name: Option<String>,
    pub model_name: Option<String>,
    pub mount: Option<Mount>,
    pub terrain_storage_id: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub block_type_id: String,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub world_id: String,
    pub chunk_key: String,
    pub blocks: Vec<Block>,
}

/// Hex grid cells are formatted `q;r`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub cell: String,
    pub neighbors: Vec<String>,
    /// Steps from the `0;0` cell.
    pub distance: i64,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub collection: String,
    pub file: String,
    pub world_id: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub collection: String,
    pub file: String,
    pub world_id: Option<String>,
    #[serde(default)]
    pub mode: ImportMode,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct ErrorBody {
    pub error: String,
    /// Whether repeating the same request may succeed.
    pub retryable: bool,
}
