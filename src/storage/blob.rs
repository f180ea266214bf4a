use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::err::WorldError;

const BLOBS_DIR: &str = "blobs";
const TMP_DIR: &str = "tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageMeta {
    pub(crate) entity_type: Option<String>,
    pub(crate) schema: Option<String>,
    pub(crate) compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageInfo {
    pub(crate) id: String,
    /// Payload size as stored (after compression).
    pub(crate) size: u64,
    #[serde(flatten)]
    pub(crate) meta: StorageMeta,
}

/// Blob storage addressed by generated storage ids.
#[async_trait]
pub(crate) trait BlobStore: Send + Sync {
    /// Stores a new blob. Compressed blobs are handed over already compressed.
    async fn store(&self, bytes: &[u8], meta: StorageMeta) -> Result<StorageInfo, WorldError>;

    async fn load(&self, storage_id: &str) -> Result<Vec<u8>, WorldError>;

    async fn info(&self, storage_id: &str) -> Result<Option<StorageInfo>, WorldError>;

    async fn delete(&self, storage_id: &str) -> Result<bool, WorldError>;

    /// Writes the plain (decompressed) payload to `path`.
    async fn export_to_file(&self, storage_id: &str, path: &Path) -> Result<StorageInfo, WorldError>;

    /// Atomically replaces the payload with the plain content of `path` (re-compressing when
    /// the blob is compressed) and records the new schema version. `path` is consumed.
    async fn replace_from_file(
        &self,
        storage_id: &str,
        path: &Path,
        schema: Option<&str>,
    ) -> Result<StorageInfo, WorldError>;

    /// Directory for staging files that belong to this store.
    fn temp_dir(&self) -> PathBuf;
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so readers see either
/// the old or the new content.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WorldError> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

pub(crate) fn compress(bytes: &[u8], level: i32) -> Result<Vec<u8>, WorldError> {
    zstd::encode_all(bytes, level).map_err(|e| WorldError::Io(format!("zstd encode failed: {e}")))
}

pub(crate) fn decompress(bytes: &[u8]) -> Result<Vec<u8>, WorldError> {
    zstd::decode_all(bytes).map_err(|e| WorldError::Io(format!("zstd decode failed: {e}")))
}

/// Filesystem blob store. Each blob is one file holding a one-line JSON `StorageInfo`
/// header followed by the payload, so header and payload are always replaced together.
#[derive(Debug, Clone)]
pub(crate) struct FsBlobStore {
    root: PathBuf,
    blobs_dir: PathBuf,
    compression_level: i32,
}

impl FsBlobStore {
    pub(crate) fn new(root: impl AsRef<Path>, compression_level: i32) -> Self {
        let root = root.as_ref().to_path_buf();
        let blobs_dir = root.join(BLOBS_DIR);
        Self {
            root,
            blobs_dir,
            compression_level,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, storage_id: &str) -> Result<PathBuf, WorldError> {
        validate_storage_id(storage_id)?;
        Ok(self.blobs_dir.join(format!("{storage_id}.blob")))
    }

    async fn ensure_dirs(&self) -> Result<(), WorldError> {
        fs::create_dir_all(&self.blobs_dir).await?;
        fs::create_dir_all(self.temp_dir()).await?;
        Ok(())
    }

    async fn read_blob(&self, storage_id: &str) -> Result<Option<(StorageInfo, Vec<u8>)>, WorldError> {
        let path = self.blob_path(storage_id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = bytes
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| WorldError::Serde(format!("blob '{storage_id}' has no header")))?;
        let info: StorageInfo = serde_json::from_slice(&bytes[..split])?;
        Ok(Some((info, bytes[split + 1..].to_vec())))
    }

    async fn write_blob(&self, info: &StorageInfo, payload: &[u8]) -> Result<(), WorldError> {
        self.ensure_dirs().await?;
        let path = self.blob_path(&info.id)?;
        let mut bytes = serde_json::to_vec(info)?;
        bytes.push(b'\n');
        bytes.extend_from_slice(payload);
        write_atomic(&path, &bytes).await
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: &[u8], meta: StorageMeta) -> Result<StorageInfo, WorldError> {
        let info = StorageInfo {
            id: Uuid::new_v4().simple().to_string(),
            size: bytes.len() as u64,
            meta,
        };
        self.write_blob(&info, bytes).await?;
        Ok(info)
    }

    async fn load(&self, storage_id: &str) -> Result<Vec<u8>, WorldError> {
        self.read_blob(storage_id)
            .await?
            .map(|(_, payload)| payload)
            .ok_or_else(|| WorldError::NotFound(format!("storage '{storage_id}'")))
    }

    async fn info(&self, storage_id: &str) -> Result<Option<StorageInfo>, WorldError> {
        Ok(self.read_blob(storage_id).await?.map(|(info, _)| info))
    }

    async fn delete(&self, storage_id: &str) -> Result<bool, WorldError> {
        match fs::remove_file(self.blob_path(storage_id)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn export_to_file(&self, storage_id: &str, path: &Path) -> Result<StorageInfo, WorldError> {
        let (info, payload) = self
            .read_blob(storage_id)
            .await?
            .ok_or_else(|| WorldError::NotFound(format!("storage '{storage_id}'")))?;
        let plain = if info.meta.compressed {
            decompress(&payload)?
        } else {
            payload
        };
        fs::write(path, plain).await?;
        Ok(info)
    }

    async fn replace_from_file(
        &self,
        storage_id: &str,
        path: &Path,
        schema: Option<&str>,
    ) -> Result<StorageInfo, WorldError> {
        let current = self
            .info(storage_id)
            .await?
            .ok_or_else(|| WorldError::NotFound(format!("storage '{storage_id}'")))?;
        let plain = fs::read(path).await?;
        let payload = if current.meta.compressed {
            compress(&plain, self.compression_level)?
        } else {
            plain
        };
        let info = StorageInfo {
            id: current.id,
            size: payload.len() as u64,
            meta: StorageMeta {
                schema: schema.map(str::to_string),
                ..current.meta
            },
        };
        self.write_blob(&info, &payload).await?;
        fs::remove_file(path).await?;
        Ok(info)
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }
}

fn validate_storage_id(storage_id: &str) -> Result<(), WorldError> {
    let valid = !storage_id.is_empty()
        && storage_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WorldError::Validation(format!("invalid storage id '{storage_id}'")))
    }
}
