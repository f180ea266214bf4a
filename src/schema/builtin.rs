use std::sync::Arc;

use serde_json::Value;

use crate::err::WorldError;
use crate::schema::migrator::{JsonMigrator, SchemaMigrator};

/// Migrators for the entities this service persists.
pub(crate) fn migrators() -> Result<Vec<Arc<dyn SchemaMigrator>>, WorldError> {
    let migrators: Vec<Arc<dyn SchemaMigrator>> = vec![
        Arc::new(layer_type_field()?),
        Arc::new(layer_hidden_groups()?),
        Arc::new(chunk_data_block_type_field()?),
    ];
    Ok(migrators)
}

/// Early layers stored `type` in lower case and had no `enabled` flag.
fn layer_type_field() -> Result<JsonMigrator, WorldError> {
    JsonMigrator::new("Layer", "0", "1.0.0", |doc| {
        if let Some(Value::String(kind)) = doc.remove("type") {
            doc.insert("layerType".into(), Value::String(kind.to_uppercase()));
        }
        doc.entry("enabled").or_insert(Value::Bool(true));
        Ok(())
    })
}

fn layer_hidden_groups() -> Result<JsonMigrator, WorldError> {
    JsonMigrator::new("Layer", "1.0.0", "1.1.0", |doc| {
        doc.entry("hiddenGroups").or_insert(Value::Array(vec![]));
        Ok(())
    })
}

/// Blocks inside chunk data used `blockId` before the `group/name` type ids.
fn chunk_data_block_type_field() -> Result<JsonMigrator, WorldError> {
    JsonMigrator::new("LayerChunkData", "0", "1.0.0", |doc| {
        let Some(Value::Array(blocks)) = doc.get_mut("blocks") else {
            return Ok(());
        };
        for entry in blocks.iter_mut() {
            let Some(block) = entry.get_mut("block").and_then(Value::as_object_mut) else {
                return Err(WorldError::Migration("layer block without 'block' object".into()));
            };
            if let Some(id) = block.remove("blockId") {
                block.insert("blockTypeId".into(), id);
            }
        }
        Ok(())
    })
}
