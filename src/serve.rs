use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use voxelworld_lib::transfer::OperationStatus;

use crate::chunk::cache::TerrainChunkCache;
use crate::chunk::dirty::DirtyChunkTracker;
use crate::config::Settings;
use crate::err::WorldError;
use crate::layer::origin::BlockOriginResolver;
use crate::layer::store::{DeletedResources, LayerStore};
use crate::schema::builtin;
use crate::schema::registry::MigratorRegistry;
use crate::schema::service::SchemaMigrationService;
use crate::storage::blob::{BlobStore, FsBlobStore};
use crate::storage::entity::EntityRepository;
use crate::storage::locks::KeyedLocks;
use crate::storage::files::FsDocumentStore;
use crate::storage::raw::DocumentStore;
use crate::transfer::ImportExportService;
use crate::web;

/// Every service of the world engine, wired once.
pub(crate) struct Services {
    pub(crate) settings: Arc<Settings>,
    pub(crate) migrations: Arc<SchemaMigrationService>,
    pub(crate) tracker: Arc<DirtyChunkTracker>,
    pub(crate) layers: Arc<LayerStore>,
    pub(crate) cache: Arc<TerrainChunkCache>,
    pub(crate) resolver: BlockOriginResolver,
    pub(crate) transfer: ImportExportService,
}

impl Services {
    pub(crate) fn new(settings: Settings) -> Result<Self, WorldError> {
        let store = Arc::new(FsDocumentStore::open(&settings.data_dir)?);
        let blobs = Arc::new(FsBlobStore::new(&settings.data_dir, settings.compression_level));
        info!("Blobs stored under {}", blobs.root().display());
        Self::with_stores(settings, store, blobs)
    }

    pub(crate) fn with_stores(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, WorldError> {
        let settings = Arc::new(settings);
        let registry = MigratorRegistry::new(builtin::migrators()?)?;
        info!("Schema migrators registered for {}", registry.entity_types().join(", "));
        let migrations = Arc::new(SchemaMigrationService::new(registry, blobs.clone()));
        let repo = Arc::new(EntityRepository::new(store.clone(), migrations.clone()));
        let tracker = Arc::new(DirtyChunkTracker::new(repo.clone()));
        let chunk_locks = Arc::new(KeyedLocks::new());
        let layers = Arc::new(LayerStore::new(
            repo.clone(),
            settings.clone(),
            tracker.clone(),
            chunk_locks.clone(),
        ));
        let cache = Arc::new(TerrainChunkCache::new(
            layers.clone(),
            repo.clone(),
            blobs,
            tracker.clone(),
            chunk_locks,
            settings.clone(),
        ));
        Ok(Self {
            resolver: BlockOriginResolver::new(layers.clone(), repo),
            transfer: ImportExportService::new(store, migrations.clone()),
            settings,
            migrations,
            tracker,
            layers,
            cache,
        })
    }

    /// Cleanup after the owning world record is gone.
    pub(crate) async fn delete_world(&self, world_id: &str) -> Result<DeletedResources, WorldError> {
        let deleted = self.layers.delete_world_resources(world_id).await?;
        self.cache.invalidate_world(world_id).await?;
        Ok(deleted)
    }
}

/// Regenerates dirty chunks in the background until the process exits.
async fn run_sweeper(cache: Arc<TerrainChunkCache>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let result = cache.sweep().await;
        if result.status != OperationStatus::Success {
            warn!("{} chunks could not be regenerated; they stay dirty", result.failed);
        }
    }
}

pub(crate) async fn start_server(settings: Settings) -> Result<(), WorldError> {
    let services = Arc::new(Services::new(settings)?);
    services.tracker.restore().await?;

    if let Some(interval) = services.settings.sweep_interval {
        let cache = services.cache.clone();
        tokio::spawn(async move { run_sweeper(cache, interval).await });
        info!("Dirty chunk sweep every {}s", interval.as_secs());
    }

    web::serve::init(services).await
}
