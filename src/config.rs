use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::err::WorldError;
use crate::ident::world_id::WorldId;

pub(crate) const DEFAULT_CHUNK_SIZE: i32 = 32;
const DEFAULT_WEB_PORT: u16 = 8080;
const DEFAULT_SWEEP_SECS: u64 = 10;
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Runtime configuration. Built once in `main` and shared by reference with every service.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) data_dir: PathBuf,
    pub(crate) chunk_size: i32,
    /// Chunk size overrides keyed by main world id.
    pub(crate) chunk_sizes: HashMap<String, i32>,
    pub(crate) web_port: u16,
    pub(crate) sweep_interval: Option<Duration>,
    pub(crate) compression_level: i32,
    pub(crate) cors_origin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_sizes: HashMap::new(),
            web_port: DEFAULT_WEB_PORT,
            sweep_interval: Some(Duration::from_secs(DEFAULT_SWEEP_SECS)),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            cors_origin: "http://127.0.0.1:8000".into(),
        }
    }
}

impl Settings {
    pub(crate) fn from_env() -> Result<Self, WorldError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorldError> {
        let mut settings = Settings::default();
        if let Some(dir) = lookup("VOXEL_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("VOXEL_CHUNK_SIZE") {
            settings.chunk_size = parse_chunk_size(&size)?;
        }
        if let Some(sizes) = lookup("VOXEL_CHUNK_SIZES") {
            for entry in sizes.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (world, size) = entry.split_once('=').ok_or_else(|| {
                    WorldError::Validation(format!("VOXEL_CHUNK_SIZES entry '{entry}' is not world=size"))
                })?;
                let world = WorldId::parse(world.trim())?;
                settings
                    .chunk_sizes
                    .insert(world.main_id().to_string(), parse_chunk_size(size)?);
            }
        }
        if let Some(port) = lookup("VOXEL_WEB_PORT") {
            settings.web_port = port
                .trim()
                .parse()
                .map_err(|_| WorldError::Validation(format!("VOXEL_WEB_PORT '{port}' is not a port")))?;
        }
        if let Some(secs) = lookup("VOXEL_SWEEP_INTERVAL_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                WorldError::Validation(format!("VOXEL_SWEEP_INTERVAL_SECS '{secs}' is not a number"))
            })?;
            settings.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(level) = lookup("VOXEL_COMPRESSION_LEVEL") {
            settings.compression_level = level.trim().parse().map_err(|_| {
                WorldError::Validation(format!("VOXEL_COMPRESSION_LEVEL '{level}' is not a number"))
            })?;
        }
        if let Some(origin) = lookup("VOXEL_CORS_ORIGIN") {
            settings.cors_origin = origin;
        }
        Ok(settings)
    }

    /// Chunk size for a world. Always keyed by the main world id.
    pub(crate) fn chunk_size_for(&self, world_id: &WorldId) -> i32 {
        self.chunk_sizes
            .get(world_id.main_id().as_str())
            .copied()
            .unwrap_or(self.chunk_size)
    }
}

fn parse_chunk_size(value: &str) -> Result<i32, WorldError> {
    match value.trim().parse::<i32>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(WorldError::Validation(format!(
            "chunk size '{value}' must be a positive integer"
        ))),
    }
}
