pub(crate) mod area;
pub(crate) mod block_type;
pub(crate) mod chunk_key;
pub(crate) mod hex;
pub(crate) mod world_id;
