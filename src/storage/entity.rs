use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::err::WorldError;
use crate::schema::service::SchemaMigrationService;
use crate::storage::document::{self, CLASS_FIELD};
use crate::storage::raw::DocumentStore;

/// A typed persisted document. Implemented with `#[derive(Entity)]`.
pub(crate) trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type tag written to `_class`; selects the migrator chain.
    const ENTITY_TYPE: &'static str;
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// Typed access on top of the raw document store.
///
/// Saves stamp `_class` and the latest `_schema` of the type; loads upgrade older
/// documents through the migration service before deserializing them.
pub(crate) struct EntityRepository {
    store: Arc<dyn DocumentStore>,
    migrations: Arc<SchemaMigrationService>,
}

impl EntityRepository {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, migrations: Arc<SchemaMigrationService>) -> Self {
        Self { store, migrations }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub(crate) async fn save<E: Entity>(&self, entity: &E) -> Result<(), WorldError> {
        let raw = encode(entity, &self.migrations)?;
        self.store.replace(E::COLLECTION, entity.id(), raw).await
    }

    /// Like `save` but fails with `Conflict` when the id exists.
    pub(crate) async fn insert<E: Entity>(&self, entity: &E) -> Result<(), WorldError> {
        let raw = encode(entity, &self.migrations)?;
        self.store.insert(E::COLLECTION, entity.id(), raw).await
    }

    pub(crate) async fn load<E: Entity>(&self, id: &str) -> Result<Option<E>, WorldError> {
        match self.store.find_by_id(E::COLLECTION, id).await? {
            Some(raw) => Ok(Some(decode(&raw, &self.migrations)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn find_all<E: Entity>(&self) -> Result<Vec<E>, WorldError> {
        self.store
            .find_all(E::COLLECTION)
            .await?
            .iter()
            .map(|raw| decode(raw, &self.migrations))
            .collect()
    }

    pub(crate) async fn find_by_field<E: Entity>(&self, field: &str, value: &str) -> Result<Vec<E>, WorldError> {
        self.store
            .find_by_field(E::COLLECTION, field, value)
            .await?
            .iter()
            .map(|raw| decode(raw, &self.migrations))
            .collect()
    }

    /// Atomic read-modify-write of one entity. The mutator may fail, in which case
    /// nothing is written.
    pub(crate) async fn modify<E, F>(&self, id: &str, mutator: F) -> Result<Option<E>, WorldError>
    where
        E: Entity,
        F: FnOnce(&mut E) -> Result<(), WorldError> + Send + 'static,
    {
        let migrations = self.migrations.clone();
        let updated = self
            .store
            .modify(
                E::COLLECTION,
                id,
                Box::new(move |raw: String| {
                    let mut entity: E = decode(&raw, &migrations)?;
                    mutator(&mut entity)?;
                    encode(&entity, &migrations)
                }),
            )
            .await?;
        match updated {
            Some(raw) => Ok(Some(decode(&raw, &self.migrations)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn delete<E: Entity>(&self, id: &str) -> Result<bool, WorldError> {
        self.store.delete(E::COLLECTION, id).await
    }

    pub(crate) async fn delete_by_field<E: Entity>(&self, field: &str, value: &str) -> Result<u64, WorldError> {
        self.store.delete_by_field(E::COLLECTION, field, value).await
    }
}

fn encode<E: Entity>(entity: &E, migrations: &SchemaMigrationService) -> Result<String, WorldError> {
    let Value::Object(mut doc) = serde_json::to_value(entity)? else {
        return Err(WorldError::Serde(format!("{} does not serialize to an object", E::ENTITY_TYPE)));
    };
    doc.insert(CLASS_FIELD.into(), Value::String(E::ENTITY_TYPE.into()));
    if let Some(latest) = migrations.latest_version(E::ENTITY_TYPE) {
        document::set_schema_version(&mut doc, &latest);
    }
    document::to_string(&doc)
}

fn decode<E: Entity>(raw: &str, migrations: &SchemaMigrationService) -> Result<E, WorldError> {
    let migrated = migrations.migrate_to_latest(raw, E::ENTITY_TYPE)?;
    Ok(serde_json::from_str(&migrated)?)
}
