use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use voxelworld_lib::transfer::{ExportResult, ImportMode, ImportResult, OperationStatus};

use crate::err::WorldError;
use crate::ident::world_id::WorldId;
use crate::schema::service::SchemaMigrationService;
use crate::storage::document;
use crate::storage::raw::DocumentStore;

/// Dumps and loads collections as `.jsonl`, one raw document per line.
///
/// Both directions work on raw documents so fields unknown to the typed model survive.
pub(crate) struct ImportExportService {
    store: Arc<dyn DocumentStore>,
    migrations: Arc<SchemaMigrationService>,
}

impl ImportExportService {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, migrations: Arc<SchemaMigrationService>) -> Self {
        Self { store, migrations }
    }

    /// Fails outright only when the world filter is malformed or the file can not be
    /// created. Later write errors end up in `failure`. Documents are written to a sibling
    /// `.tmp` file that replaces `output` once complete, so `output` is never left truncated.
    pub(crate) async fn export_collection(
        &self,
        collection: &str,
        output: &Path,
        world_id: Option<&str>,
    ) -> Result<ExportResult, WorldError> {
        let filter = world_filter(world_id)?;
        let documents = self.store.find_all(collection).await?;
        let staging = staging_path(output);
        let mut writer = BufWriter::new(File::create(&staging).await?);
        let mut result = ExportResult {
            collection: collection.to_string(),
            file: output.display().to_string(),
            exported_count: 0,
            skipped_by_filter: 0,
            status: OperationStatus::Success,
            failure: None,
        };

        for raw in documents {
            let parsed = document::parse(&raw);
            if let Some(filter) = &filter {
                let matches = parsed
                    .as_ref()
                    .is_ok_and(|doc| document_world(doc).as_deref() == Some(filter.as_str()));
                if !matches {
                    result.skipped_by_filter += 1;
                    continue;
                }
            }
            let line = match parsed {
                Ok(doc) if raw.contains('\n') => document::to_string(&doc)?,
                _ => raw,
            };
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await
            }
            .await;
            if let Err(e) = written {
                result.failure = Some(format!("write failed after {} documents: {e}", result.exported_count));
                break;
            }
            result.exported_count += 1;
        }
        if result.failure.is_none() {
            if let Err(e) = writer.flush().await {
                result.failure = Some(format!("flush failed: {e}"));
            }
        }
        drop(writer);
        if result.failure.is_none() {
            if let Err(e) = tokio::fs::rename(&staging, output).await {
                result.failure = Some(format!("replacing {} failed: {e}", output.display()));
            }
        }
        if result.failure.is_some() {
            let _ = tokio::fs::remove_file(&staging).await;
        }

        result.status = OperationStatus::classify(0, result.failure.is_some());
        info!(
            "Exported {} documents of '{collection}' to {} ({} filtered)",
            result.exported_count, result.file, result.skipped_by_filter
        );
        Ok(result)
    }

    /// Imports line by line. Bad lines are counted and listed in `failed_lines`; a line whose
    /// migration fails is imported as it is.
    pub(crate) async fn import_collection(
        &self,
        collection: &str,
        input: &Path,
        world_id: Option<&str>,
        mode: ImportMode,
    ) -> Result<ImportResult, WorldError> {
        let filter = world_filter(world_id)?;
        let mut lines = BufReader::new(File::open(input).await?).lines();
        let mut result = ImportResult::new(collection, &input.display().to_string());
        let mut line_number = 0u64;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    result.failure = Some(format!("read failed after line {line_number}: {e}"));
                    break;
                }
            };
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            result.total_count += 1;
            if let Err(e) = self
                .import_line(collection, &line, filter.as_deref(), mode, &mut result)
                .await
            {
                warn!("Import of '{collection}' line {line_number} failed: {e}");
                result.error_count += 1;
                result.failed_lines.push(line_number);
            }
        }

        result.status = OperationStatus::classify(result.error_count, result.failure.is_some());
        info!(
            "Imported '{collection}' from {}: {} of {} written, {} migrated, {} existing, {} filtered, {} untyped, {} errors",
            result.file,
            result.success_count,
            result.total_count,
            result.migration_count,
            result.skipped_existing,
            result.skipped_by_filter,
            result.skipped_untyped,
            result.error_count
        );
        Ok(result)
    }

    async fn import_line(
        &self,
        collection: &str,
        line: &str,
        filter: Option<&str>,
        mode: ImportMode,
        result: &mut ImportResult,
    ) -> Result<(), WorldError> {
        let doc = document::parse(line)?;
        if let Some(filter) = filter {
            if document_world(&doc).as_deref() != Some(filter) {
                result.skipped_by_filter += 1;
                return Ok(());
            }
        }
        let Some(entity_type) = document::entity_type(&doc) else {
            warn!("Skipping '{collection}' document without _class type tag");
            result.skipped_untyped += 1;
            return Ok(());
        };
        let id = document::id(&doc).ok_or_else(|| WorldError::Validation("document has no _id".into()))?;

        let migrated = match self.migrations.migrate(line, entity_type, None) {
            Ok(migrated) => {
                if migrated.steps > 0 {
                    result.migration_count += 1;
                }
                migrated.document
            }
            Err(e) => {
                warn!("Importing {entity_type} '{id}' unmigrated: {e}");
                result.migration_failures += 1;
                line.to_string()
            }
        };

        if self.store.exists(collection, &id).await? {
            match mode {
                ImportMode::Skip => {
                    result.skipped_existing += 1;
                    return Ok(());
                }
                ImportMode::Overwrite => self.store.replace(collection, &id, migrated).await?,
            }
        } else {
            self.store.insert(collection, &id, migrated).await?;
        }
        result.success_count += 1;
        Ok(())
    }
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

fn world_filter(world_id: Option<&str>) -> Result<Option<String>, WorldError> {
    world_id
        .map(|id| WorldId::parse(id).map(|world| world.main_id().to_string()))
        .transpose()
}

/// The document's `worldId`, instance-stripped when it parses.
fn document_world(doc: &document::Document) -> Option<String> {
    let raw = document::world_id(doc)?;
    Some(match WorldId::parse(raw) {
        Ok(world) => world.main_id().to_string(),
        Err(_) => raw.to_string(),
    })
}

#[cfg(test)]
mod test {
    use serde_json::Value;

    use super::*;
    use crate::schema::migrator::{JsonMigrator, SchemaMigrator};
    use crate::schema::registry::MigratorRegistry;
    use crate::storage::blob::FsBlobStore;
    use crate::storage::raw::MemoryDocumentStore;
    use crate::test_util::temp_dir;

    fn service(migrators: Vec<Arc<dyn SchemaMigrator>>) -> (ImportExportService, Arc<dyn DocumentStore>) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let migrations = SchemaMigrationService::new(
            MigratorRegistry::new(migrators).unwrap(),
            Arc::new(FsBlobStore::new(temp_dir("transfer-blobs"), 3)),
        );
        (ImportExportService::new(store.clone(), Arc::new(migrations)), store)
    }

    fn to_v2(entity: &str) -> Arc<dyn SchemaMigrator> {
        Arc::new(
            JsonMigrator::new(entity, "1", "2", |doc| {
                doc.insert("upgraded".into(), Value::Bool(true));
                Ok(())
            })
            .unwrap(),
        )
    }

    async fn snapshot(store: &Arc<dyn DocumentStore>, collection: &str) -> Vec<String> {
        store.find_all(collection).await.unwrap()
    }

    #[tokio::test]
    async fn export_import_round_trip_migrates_pending_types() {
        let dir = temp_dir("transfer-roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("things.jsonl");
        let (source, source_store) = service(vec![to_v2("Alpha"), to_v2("Beta")]);
        for i in 0..1000 {
            let raw = if i % 2 == 0 {
                format!(r#"{{"_id":"a{i}","_class":"de.world.Alpha","_schema":"1","n":{i}}}"#)
            } else {
                format!(r#"{{"_id":"b{i}","_class":"Beta","_schema":"2","n":{i}}}"#)
            };
            source_store.insert("things", &format!("{i}"), raw).await.unwrap();
        }
        let exported = source.export_collection("things", &file, None).await.unwrap();
        assert_eq!(exported.exported_count, 1000);
        assert_eq!(exported.status, OperationStatus::Success);
        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content.lines().count(), 1000);
        assert!(content.contains(r#""_schema":"1""#));

        let (target, target_store) = service(vec![to_v2("Alpha"), to_v2("Beta")]);
        let imported = target
            .import_collection("things", &file, None, ImportMode::Skip)
            .await
            .unwrap();
        assert_eq!(imported.total_count, 1000);
        assert_eq!(imported.success_count, 1000);
        assert_eq!(imported.migration_count, 500);
        assert_eq!(imported.error_count, 0);
        assert_eq!(imported.status, OperationStatus::Success);
        let migrated = target_store.find_by_id("things", "a0").await.unwrap().unwrap();
        assert!(migrated.contains(r#""_schema":"2""#));
        assert!(migrated.contains(r#""upgraded":true"#));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn skip_mode_is_idempotent() {
        let dir = temp_dir("transfer-skip");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("layers.jsonl");
        std::fs::write(
            &file,
            "{\"_id\":\"l1\",\"_class\":\"Layer\",\"worldId\":\"w1\"}\n{\"_id\":\"l2\",\"_class\":\"Layer\",\"worldId\":\"w1\"}\n",
        )
        .unwrap();
        let (service, store) = service(vec![]);
        let first = service
            .import_collection("layers", &file, None, ImportMode::Skip)
            .await
            .unwrap();
        assert_eq!(first.success_count, 2);
        let before = snapshot(&store, "layers").await;

        let second = service
            .import_collection("layers", &file, None, ImportMode::Skip)
            .await
            .unwrap();
        assert_eq!(second.success_count, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(snapshot(&store, "layers").await, before);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn overwrite_mode_takes_second_file() {
        let dir = temp_dir("transfer-overwrite");
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("first.jsonl");
        let second = dir.join("second.jsonl");
        std::fs::write(&first, "{\"_id\":\"x\",\"_class\":\"Layer\",\"name\":\"old\"}\n").unwrap();
        std::fs::write(&second, "{\"_id\":\"x\",\"_class\":\"Layer\",\"name\":\"new\"}\n").unwrap();
        let (service, store) = service(vec![]);
        service
            .import_collection("layers", &first, None, ImportMode::Overwrite)
            .await
            .unwrap();
        let result = service
            .import_collection("layers", &second, None, ImportMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(
            snapshot(&store, "layers").await,
            vec![r#"{"_id":"x","_class":"Layer","name":"new"}"#.to_string()]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bad_lines_are_counted_not_fatal() {
        let dir = temp_dir("transfer-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("mixed.jsonl");
        let broken: Arc<dyn SchemaMigrator> = Arc::new(
            JsonMigrator::new("Layer", "0", "1", |_| Err(WorldError::Migration("nope".into()))).unwrap(),
        );
        std::fs::write(
            &file,
            [
                r#"{"_id":"a","_class":"Layer","worldId":"w1!s1"}"#,
                "not json",
                r#"{"_id":"b","worldId":"w1"}"#,
                "",
                r#"{"_id":"c","_class":"Layer","worldId":"w2"}"#,
                r#"{"_class":"Layer","worldId":"w1"}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        let (service, store) = service(vec![broken]);
        let result = service
            .import_collection("layers", &file, Some("w1"), ImportMode::Skip)
            .await
            .unwrap();
        assert_eq!(result.total_count, 5);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.migration_failures, 1);
        assert_eq!(result.migration_count, 0);
        assert_eq!(result.skipped_by_filter, 1);
        assert_eq!(result.skipped_untyped, 1);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.failed_lines, vec![2, 6]);
        assert_eq!(result.status, OperationStatus::PartialFailure);
        assert_eq!(
            store.find_by_id("layers", "a").await.unwrap().as_deref(),
            Some(r#"{"_id":"a","_class":"Layer","worldId":"w1!s1"}"#)
        );

        assert!(matches!(
            service
                .import_collection("layers", &dir.join("missing.jsonl"), None, ImportMode::Skip)
                .await,
            Err(WorldError::Io(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn untyped_documents_are_skipped() {
        let dir = temp_dir("transfer-untyped");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("layers.jsonl");
        std::fs::write(&file, "{\"_id\":\"a\",\"_class\":\"Layer\"}\n{\"_id\":\"b\"}\n").unwrap();
        let (service, store) = service(vec![]);
        let result = service
            .import_collection("layers", &file, None, ImportMode::Skip)
            .await
            .unwrap();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.skipped_untyped, 1);
        assert_eq!(result.error_count, 0);
        assert!(result.failed_lines.is_empty());
        assert_eq!(result.status, OperationStatus::Success);
        assert!(store.find_by_id("layers", "b").await.unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn export_replaces_output_only_when_complete() {
        let dir = temp_dir("transfer-staging");
        std::fs::create_dir_all(&dir).unwrap();
        let (service, store) = service(vec![]);
        store.insert("layers", "1", r#"{"_id":"1"}"#.into()).await.unwrap();

        let file = dir.join("out.jsonl");
        std::fs::write(&file, "stale\n").unwrap();
        let done = service.export_collection("layers", &file, None).await.unwrap();
        assert_eq!(done.status, OperationStatus::Success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{\"_id\":\"1\"}\n");
        assert!(!dir.join("out.jsonl.tmp").exists());

        let occupied = dir.join("busy.jsonl");
        std::fs::create_dir_all(occupied.join("inner")).unwrap();
        let failed = service.export_collection("layers", &occupied, None).await.unwrap();
        assert_eq!(failed.status, OperationStatus::Failure);
        assert!(failed.failure.is_some());
        assert!(occupied.join("inner").is_dir());
        assert!(!dir.join("busy.jsonl.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn export_filters_by_main_world() {
        let dir = temp_dir("transfer-filter");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("out.jsonl");
        let (service, store) = service(vec![]);
        store.insert("layers", "1", r#"{"_id":"1","worldId":"r1:earth"}"#.into()).await.unwrap();
        store.insert("layers", "2", r#"{"_id":"2","worldId":"r1:mars"}"#.into()).await.unwrap();
        store.insert("layers", "3", r#"{"_id":"3"}"#.into()).await.unwrap();
        let result = service
            .export_collection("layers", &file, Some("r1:earth!s7"))
            .await
            .unwrap();
        assert_eq!(result.exported_count, 1);
        assert_eq!(result.skipped_by_filter, 2);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "{\"_id\":\"1\",\"worldId\":\"r1:earth\"}\n"
        );
        assert!(matches!(
            service.export_collection("layers", &file, Some("bad world")).await,
            Err(WorldError::Validation(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
