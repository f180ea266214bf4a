use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::Settings;
use crate::schema::builtin;
use crate::schema::registry::MigratorRegistry;
use crate::schema::service::SchemaMigrationService;
use crate::serve::Services;
use crate::storage::blob::FsBlobStore;
use crate::storage::entity::EntityRepository;
use crate::storage::raw::MemoryDocumentStore;

/// Unique, not yet created directory under the system temp dir.
pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("voxelworld-{prefix}-{}", Uuid::new_v4().simple()))
}

/// In-memory repository with the builtin migrators. Its blob store is never written.
pub(crate) fn repository() -> Arc<EntityRepository> {
    let migrations = SchemaMigrationService::new(
        MigratorRegistry::new(builtin::migrators().unwrap()).unwrap(),
        Arc::new(FsBlobStore::new(temp_dir("unused"), 3)),
    );
    Arc::new(EntityRepository::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(migrations),
    ))
}

/// Fully wired services over a fresh data dir. Remove the returned dir when done.
pub(crate) fn services(prefix: &str) -> (Services, PathBuf) {
    let dir = temp_dir(prefix);
    let settings = Settings {
        data_dir: dir.clone(),
        sweep_interval: None,
        ..Settings::default()
    };
    (Services::new(settings).unwrap(), dir)
}
