use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info};
use serde::Serialize;
use uuid::Uuid;

use crate::err::WorldError;
use crate::schema::migrator::SchemaMigrator;
use crate::schema::registry::MigratorRegistry;
use crate::schema::version::SchemaVersion;
use crate::storage::blob::BlobStore;
use crate::storage::document;

/// Result of migrating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Migrated {
    pub(crate) document: String,
    pub(crate) steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum MigrationStatus {
    Migrated,
    UpToDate,
    /// The blob carries no entity type, or the type has no migrators.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MigrationResult {
    pub(crate) storage_id: String,
    pub(crate) entity_type: Option<String>,
    pub(crate) from_version: String,
    pub(crate) to_version: String,
    pub(crate) steps: usize,
    pub(crate) status: MigrationStatus,
}

pub(crate) struct SchemaMigrationService {
    registry: MigratorRegistry,
    blobs: Arc<dyn BlobStore>,
    in_flight: DashMap<String, ()>,
}

struct InFlight<'a> {
    map: &'a DashMap<String, ()>,
    storage_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.storage_id);
    }
}

impl SchemaMigrationService {
    pub(crate) fn new(registry: MigratorRegistry, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            registry,
            blobs,
            in_flight: DashMap::new(),
        }
    }

    pub(crate) fn latest_version(&self, entity_type: &str) -> Option<SchemaVersion> {
        self.registry.latest_version(entity_type)
    }

    /// Migrates a document to the latest version of its type, reading the current version
    /// from `_schema`. Returns the input unchanged when nothing is pending.
    pub(crate) fn migrate_to_latest(&self, document: &str, entity_type: &str) -> Result<String, WorldError> {
        Ok(self.migrate(document, entity_type, None)?.document)
    }

    pub(crate) fn migrate_to_latest_from(
        &self,
        document: &str,
        entity_type: &str,
        current: &SchemaVersion,
    ) -> Result<String, WorldError> {
        Ok(self.migrate(document, entity_type, Some(current))?.document)
    }

    pub(crate) fn migrate(
        &self,
        raw: &str,
        entity_type: &str,
        current: Option<&SchemaVersion>,
    ) -> Result<Migrated, WorldError> {
        let unchanged = || Migrated {
            document: raw.to_string(),
            steps: 0,
        };
        let Some(latest) = self.registry.latest_version(entity_type) else {
            return Ok(unchanged());
        };
        let current = match current {
            Some(current) => current.clone(),
            None => document::schema_version(&document::parse(raw)?)?,
        };
        if current >= latest {
            return Ok(unchanged());
        }
        let path = self.registry.find_migration_path(entity_type, &current, &latest)?;
        if path.is_empty() {
            return Err(WorldError::Migration(format!(
                "no usable migration path for {entity_type} from {current} to {latest}"
            )));
        }

        let mut migrated = raw.to_string();
        for migrator in &path {
            let output = migrator.migrate(&migrated).map_err(|e| step_error(migrator.as_ref(), e))?;
            let mut doc = document::parse(&output).map_err(|e| step_error(migrator.as_ref(), e))?;
            document::set_schema_version(&mut doc, &migrator.to_version());
            migrated = document::to_string(&doc)?;
        }
        debug!("Migrated {entity_type} from {current} to {latest} in {} steps", path.len());
        Ok(Migrated {
            document: migrated,
            steps: path.len(),
        })
    }

    /// Migrates a blob-backed entity through temp files. The live blob is only replaced
    /// once the whole chain has succeeded.
    pub(crate) async fn migrate_storage(&self, storage_id: &str) -> Result<MigrationResult, WorldError> {
        let _claim = self.claim(storage_id)?;
        let info = self
            .blobs
            .info(storage_id)
            .await?
            .ok_or_else(|| WorldError::NotFound(format!("storage '{storage_id}'")))?;
        let current = match &info.meta.schema {
            Some(schema) => SchemaVersion::parse(schema)?,
            None => SchemaVersion::zero(),
        };
        let mut result = MigrationResult {
            storage_id: storage_id.to_string(),
            entity_type: info.meta.entity_type.clone(),
            from_version: current.to_string(),
            to_version: current.to_string(),
            steps: 0,
            status: MigrationStatus::NotApplicable,
        };
        let Some(entity_type) = info.meta.entity_type.clone() else {
            return Ok(result);
        };
        let Some(latest) = self.registry.latest_version(&entity_type) else {
            return Ok(result);
        };
        if current >= latest {
            result.status = MigrationStatus::UpToDate;
            return Ok(result);
        }
        let path = self.registry.find_migration_path(&entity_type, &current, &latest)?;
        if path.is_empty() {
            return Err(WorldError::Migration(format!(
                "no usable migration path for {entity_type} from {current} to {latest}"
            )));
        }

        let temp_dir = self.blobs.temp_dir();
        tokio::fs::create_dir_all(&temp_dir).await?;
        let staged = temp_dir.join(format!("{storage_id}-{}.stage", Uuid::new_v4().simple()));
        if let Err(e) = self.blobs.export_to_file(storage_id, &staged).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e);
        }

        let steps = path.len();
        let chain = tokio::task::spawn_blocking(move || run_chain(path, staged, temp_dir)).await?;
        let final_path = match chain {
            Ok(final_path) => final_path,
            Err(e) => {
                error!("Migration of storage {storage_id} ({entity_type}) aborted: {e}");
                return Err(e);
            }
        };
        if let Err(e) = self
            .blobs
            .replace_from_file(storage_id, &final_path, Some(&latest.to_string()))
            .await
        {
            let _ = tokio::fs::remove_file(&final_path).await;
            return Err(e);
        }

        info!("Migrated storage {storage_id} ({entity_type}) from {current} to {latest}");
        result.to_version = latest.to_string();
        result.steps = steps;
        result.status = MigrationStatus::Migrated;
        Ok(result)
    }

    fn claim(&self, storage_id: &str) -> Result<InFlight<'_>, WorldError> {
        match self.in_flight.entry(storage_id.to_string()) {
            Entry::Occupied(_) => Err(WorldError::Busy(format!(
                "storage '{storage_id}' is already being migrated"
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(InFlight {
                    map: &self.in_flight,
                    storage_id: storage_id.to_string(),
                })
            }
        }
    }
}

fn step_error(migrator: &dyn SchemaMigrator, error: WorldError) -> WorldError {
    WorldError::Migration(format!(
        "{} migrator {} -> {} failed: {error}",
        migrator.entity_type(),
        migrator.from_version(),
        migrator.to_version()
    ))
}

/// Applies each migrator file-to-file, deleting every input as soon as it is consumed.
/// On failure no staged file is left in `temp_dir`.
fn run_chain(
    path: Vec<Arc<dyn SchemaMigrator>>,
    input: PathBuf,
    temp_dir: PathBuf,
) -> Result<PathBuf, WorldError> {
    let mut current = input;
    for migrator in path {
        let next = temp_dir.join(format!("{}.stage", Uuid::new_v4().simple()));
        let step = (|| -> Result<(), WorldError> {
            let mut reader = BufReader::new(File::open(&current)?);
            let mut writer = BufWriter::new(File::create(&next)?);
            migrator.migrate_stream(&mut reader, &mut writer)?;
            writer.flush()?;
            Ok(())
        })();
        let _ = std::fs::remove_file(&current);
        if let Err(e) = step {
            let _ = std::fs::remove_file(&next);
            return Err(step_error(migrator.as_ref(), e));
        }
        current = next;
    }
    Ok(current)
}
