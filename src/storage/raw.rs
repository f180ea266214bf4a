use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::err::WorldError;
use crate::storage::document;

pub(crate) type Mutator = Box<dyn FnOnce(String) -> Result<String, WorldError> + Send>;

/// Raw access to persisted documents. Documents are opaque JSON strings so callers that
/// only move data around (migration, import/export) never have to deserialize them.
#[async_trait]
pub(crate) trait DocumentStore: Send + Sync {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<String>, WorldError>;

    async fn exists(&self, collection: &str, id: &str) -> Result<bool, WorldError> {
        Ok(self.find_by_id(collection, id).await?.is_some())
    }

    /// Every document of the collection, ordered by id.
    async fn find_all(&self, collection: &str) -> Result<Vec<String>, WorldError>;

    /// Documents whose top-level string `field` equals `value`, ordered by id.
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>, WorldError>;

    /// Fails with `Conflict` if the id is taken.
    async fn insert(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError>;

    /// Inserts or replaces the whole document.
    async fn replace(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError>;

    /// Atomic read-modify-write of one document. Returns `None` when it does not exist;
    /// an error from the mutator leaves the stored document untouched.
    async fn modify(
        &self,
        collection: &str,
        id: &str,
        mutator: Mutator,
    ) -> Result<Option<String>, WorldError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, WorldError>;

    async fn delete_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, WorldError>;

    async fn count(&self, collection: &str) -> Result<u64, WorldError>;
}

/// In-process document store. Each collection sits behind one dashmap shard lock, which
/// gives every single-document operation the atomicity the services rely on.
#[derive(Default)]
pub(crate) struct MemoryDocumentStore {
    collections: DashMap<String, BTreeMap<String, String>>,
}

impl MemoryDocumentStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Puts a document in place without any checks, used when loading from disk.
    pub(crate) fn preload(&self, collection: &str, id: String, document: String) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
    }

    /// Ids of the documents `find_by_field` would return.
    pub(crate) fn ids_by_field(&self, collection: &str, field: &str, value: &str) -> Vec<String> {
        self.collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(_, raw)| field_matches(raw, field, value))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn field_matches(raw: &str, field: &str, value: &str) -> bool {
    document::parse(raw)
        .ok()
        .and_then(|doc| doc.get(field).cloned())
        .is_some_and(|found| found == Value::String(value.to_string()))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<String>, WorldError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id).cloned()))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<String>, WorldError> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>, WorldError> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|raw| field_matches(raw, field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError> {
        let mut documents = self.collections.entry(collection.to_string()).or_default();
        if documents.contains_key(id) {
            return Err(WorldError::Conflict(format!(
                "document '{id}' already exists in '{collection}'"
            )));
        }
        documents.insert(id.to_string(), document);
        Ok(())
    }

    async fn replace(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn modify(
        &self,
        collection: &str,
        id: &str,
        mutator: Mutator,
    ) -> Result<Option<String>, WorldError> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(current) = documents.get(id).cloned() else {
            return Ok(None);
        };
        let updated = mutator(current)?;
        documents.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, WorldError> {
        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|mut documents| documents.remove(id).is_some()))
    }

    async fn delete_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, WorldError> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|_, raw| !field_matches(raw, field, value));
        Ok((before - documents.len()) as u64)
    }

    async fn count(&self, collection: &str) -> Result<u64, WorldError> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| documents.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn insert_conflicts_replace_overwrites() {
        let store = MemoryDocumentStore::new();
        store.insert("docs", "a", r#"{"_id":"a","v":1}"#.into()).await.unwrap();
        assert!(matches!(
            store.insert("docs", "a", r#"{"_id":"a","v":2}"#.into()).await,
            Err(WorldError::Conflict(_))
        ));
        store.replace("docs", "a", r#"{"_id":"a","v":3}"#.into()).await.unwrap();
        assert_eq!(
            store.find_by_id("docs", "a").await.unwrap().as_deref(),
            Some(r#"{"_id":"a","v":3}"#)
        );
        assert!(store.exists("docs", "a").await.unwrap());
        assert!(!store.exists("other", "a").await.unwrap());
    }

    #[tokio::test]
    async fn field_queries() {
        let store = MemoryDocumentStore::new();
        store.insert("docs", "b", r#"{"_id":"b","worldId":"w1"}"#.into()).await.unwrap();
        store.insert("docs", "a", r#"{"_id":"a","worldId":"w1"}"#.into()).await.unwrap();
        store.insert("docs", "c", r#"{"_id":"c","worldId":"w2"}"#.into()).await.unwrap();
        let found = store.find_by_field("docs", "worldId", "w1").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].contains(r#""_id":"a""#));
        assert_eq!(store.delete_by_field("docs", "worldId", "w1").await.unwrap(), 2);
        assert_eq!(store.count("docs").await.unwrap(), 1);
        assert!(store.delete("docs", "c").await.unwrap());
        assert!(!store.delete("docs", "c").await.unwrap());
    }

    #[tokio::test]
    async fn modify_is_all_or_nothing() {
        let store = MemoryDocumentStore::new();
        assert_eq!(
            store.modify("docs", "x", Box::new(|s: String| Ok(s))).await.unwrap(),
            None
        );
        store.insert("docs", "x", "1".into()).await.unwrap();
        let failed = store
            .modify("docs", "x", Box::new(|_: String| Err(WorldError::Validation("nope".into()))))
            .await;
        assert!(failed.is_err());
        assert_eq!(store.find_by_id("docs", "x").await.unwrap().as_deref(), Some("1"));
        let updated = store
            .modify("docs", "x", Box::new(|s: String| Ok(format!("{s}2"))))
            .await
            .unwrap();
        assert_eq!(updated.as_deref(), Some("12"));
    }
}
