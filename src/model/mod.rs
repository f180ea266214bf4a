use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) mod block;
pub(crate) mod chunk_data;
pub(crate) mod dirty;
pub(crate) mod layer;
pub(crate) mod model;
pub(crate) mod terrain;

/// Milliseconds since the unix epoch, as stored in markers and terrain records.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
