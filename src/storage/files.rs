use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};

use crate::err::WorldError;
use crate::storage::blob::write_atomic;
use crate::storage::locks::KeyedLocks;
use crate::storage::raw::{DocumentStore, MemoryDocumentStore, Mutator};

const DOCUMENTS_DIR: &str = "documents";

/// Document store persisted under `{root}/documents/{collection}/{hex id}.json`, one file per
/// document. Everything is loaded on open and served from memory; writes go to disk first
/// through an atomic rename and are serialized per collection.
pub(crate) struct FsDocumentStore {
    dir: PathBuf,
    memory: MemoryDocumentStore,
    writers: KeyedLocks,
}

impl FsDocumentStore {
    /// Loads every stored document. Stray temp files from an interrupted write are ignored.
    pub(crate) fn open(root: impl AsRef<Path>) -> Result<Self, WorldError> {
        let dir = root.as_ref().join(DOCUMENTS_DIR);
        let memory = MemoryDocumentStore::new();
        let mut loaded = 0usize;
        if dir.is_dir() {
            for collection in fs::read_dir(&dir)? {
                let collection = collection?;
                if !collection.file_type()?.is_dir() {
                    continue;
                }
                let name = collection.file_name().to_string_lossy().into_owned();
                for file in fs::read_dir(collection.path())? {
                    let path = file?.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                        continue;
                    }
                    let Some(id) = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(decode_id)
                    else {
                        warn!("Ignoring unexpected document file {}", path.display());
                        continue;
                    };
                    memory.preload(&name, id, fs::read_to_string(&path)?);
                    loaded += 1;
                }
            }
        }
        info!("Loaded {loaded} documents from {}", dir.display());
        Ok(Self {
            dir,
            memory,
            writers: KeyedLocks::new(),
        })
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, WorldError> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(WorldError::Validation(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(self.dir.join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, WorldError> {
        Ok(self.collection_dir(collection)?.join(format!("{}.json", encode_id(id))))
    }

    async fn persist(&self, collection: &str, id: &str, document: &str) -> Result<(), WorldError> {
        let dir = self.collection_dir(collection)?;
        tokio::fs::create_dir_all(&dir).await?;
        write_atomic(&self.document_path(collection, id)?, document.as_bytes()).await
    }

    async fn unlink(&self, collection: &str, id: &str) -> Result<(), WorldError> {
        match tokio::fs::remove_file(self.document_path(collection, id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ids may contain path separators, so file names carry them hex encoded.
fn encode_id(id: &str) -> String {
    id.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_id(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<String>, WorldError> {
        self.memory.find_by_id(collection, id).await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<String>, WorldError> {
        self.memory.find_all(collection).await
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>, WorldError> {
        self.memory.find_by_field(collection, field, value).await
    }

    async fn insert(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError> {
        let _guard = self.writers.lock(collection).await;
        if self.memory.exists(collection, id).await? {
            return Err(WorldError::Conflict(format!(
                "document '{id}' already exists in '{collection}'"
            )));
        }
        self.persist(collection, id, &document).await?;
        self.memory.insert(collection, id, document).await
    }

    async fn replace(&self, collection: &str, id: &str, document: String) -> Result<(), WorldError> {
        let _guard = self.writers.lock(collection).await;
        self.persist(collection, id, &document).await?;
        self.memory.replace(collection, id, document).await
    }

    async fn modify(
        &self,
        collection: &str,
        id: &str,
        mutator: Mutator,
    ) -> Result<Option<String>, WorldError> {
        let _guard = self.writers.lock(collection).await;
        let Some(current) = self.memory.find_by_id(collection, id).await? else {
            return Ok(None);
        };
        let updated = mutator(current)?;
        self.persist(collection, id, &updated).await?;
        self.memory.replace(collection, id, updated.clone()).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, WorldError> {
        let _guard = self.writers.lock(collection).await;
        if !self.memory.exists(collection, id).await? {
            return Ok(false);
        }
        self.unlink(collection, id).await?;
        self.memory.delete(collection, id).await
    }

    async fn delete_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64, WorldError> {
        let _guard = self.writers.lock(collection).await;
        let mut deleted = 0;
        for id in self.memory.ids_by_field(collection, field, value) {
            self.unlink(collection, &id).await?;
            if self.memory.delete(collection, &id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn count(&self, collection: &str) -> Result<u64, WorldError> {
        self.memory.count(collection).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::temp_dir;

    #[test]
    fn ids_survive_file_name_encoding() {
        for id in ["w1/0:0", "a", "über/-1:2"] {
            assert_eq!(decode_id(&encode_id(id)).as_deref(), Some(id));
        }
        assert_eq!(encode_id("a/b"), "612f62");
        assert_eq!(decode_id("6"), None);
        assert_eq!(decode_id("zz"), None);
    }

    #[tokio::test]
    async fn documents_outlive_the_store() {
        let dir = temp_dir("fs-docs");
        {
            let store = FsDocumentStore::open(&dir).unwrap();
            store.insert("layers", "w1/a", r#"{"_id":"w1/a","worldId":"w1"}"#.into()).await.unwrap();
            store.insert("layers", "w1/b", r#"{"_id":"w1/b","worldId":"w1"}"#.into()).await.unwrap();
            store.insert("layers", "w2/c", r#"{"_id":"w2/c","worldId":"w2"}"#.into()).await.unwrap();
            assert!(matches!(
                store.insert("layers", "w1/a", "{}".into()).await,
                Err(WorldError::Conflict(_))
            ));
            store
                .modify("layers", "w2/c", Box::new(|_: String| Ok(r#"{"_id":"w2/c","v":2}"#.into())))
                .await
                .unwrap();
            assert_eq!(store.delete_by_field("layers", "worldId", "w1").await.unwrap(), 2);
            store.insert("dirty_chunks", "w2/0:0", r#"{"_id":"w2/0:0"}"#.into()).await.unwrap();
        }

        let reopened = FsDocumentStore::open(&dir).unwrap();
        assert_eq!(reopened.count("layers").await.unwrap(), 1);
        assert_eq!(
            reopened.find_by_id("layers", "w2/c").await.unwrap().as_deref(),
            Some(r#"{"_id":"w2/c","v":2}"#)
        );
        assert!(reopened.exists("dirty_chunks", "w2/0:0").await.unwrap());
        assert!(reopened.delete("dirty_chunks", "w2/0:0").await.unwrap());
        assert!(!reopened.delete("dirty_chunks", "w2/0:0").await.unwrap());
        assert_eq!(FsDocumentStore::open(&dir).unwrap().count("dirty_chunks").await.unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_mutation_writes_nothing() {
        let dir = temp_dir("fs-docs-modify");
        let store = FsDocumentStore::open(&dir).unwrap();
        store.insert("docs", "x", "1".into()).await.unwrap();
        let failed = store
            .modify("docs", "x", Box::new(|_: String| Err(WorldError::Validation("nope".into()))))
            .await;
        assert!(failed.is_err());
        drop(store);
        let reopened = FsDocumentStore::open(&dir).unwrap();
        assert_eq!(reopened.find_by_id("docs", "x").await.unwrap().as_deref(), Some("1"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_path_like_collections() {
        let dir = temp_dir("fs-docs-names");
        let store = FsDocumentStore::open(&dir).unwrap();
        assert!(matches!(
            store.replace("../escape", "x", "{}".into()).await,
            Err(WorldError::Validation(_))
        ));
        assert_eq!(store.count("../escape").await.unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
