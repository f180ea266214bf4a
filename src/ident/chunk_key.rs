use std::fmt::{Display, Formatter};

use crate::err::WorldError;

/// Horizontal chunk address. Its string form `"cx:cz"` is the storage key for chunk data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ChunkKey {
    pub(crate) cx: i32,
    pub(crate) cz: i32,
}

impl ChunkKey {
    pub(crate) fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Chunk holding world column (x, z). Uses floor division so negative coordinates
    /// land in negative chunks.
    pub(crate) fn from_world(x: i32, z: i32, chunk_size: i32) -> Self {
        Self {
            cx: x.div_euclid(chunk_size),
            cz: z.div_euclid(chunk_size),
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        let invalid = || WorldError::Validation(format!("invalid chunk key '{value}'"));
        let (cx, cz) = value.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            cx: cx.parse().map_err(|_| invalid())?,
            cz: cz.parse().map_err(|_| invalid())?,
        })
    }

    pub(crate) fn contains(&self, x: i32, z: i32, chunk_size: i32) -> bool {
        ChunkKey::from_world(x, z, chunk_size) == *self
    }
}

impl Display for ChunkKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.cx, self.cz)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_is_floor_division() {
        for size in [1, 16, 32] {
            for x in -70..70 {
                for z in [-33, -32, -31, -1, 0, 1, 31, 32, 33] {
                    let key = ChunkKey::from_world(x, z, size);
                    let fx = (x as f64 / size as f64).floor() as i32;
                    let fz = (z as f64 / size as f64).floor() as i32;
                    assert_eq!(key.to_string(), format!("{fx}:{fz}"));
                }
            }
        }
    }

    #[test]
    fn parse_and_contains() {
        let key = ChunkKey::parse("-1:2").unwrap();
        assert_eq!(key, ChunkKey::new(-1, 2));
        assert!(key.contains(-1, 64, 32));
        assert!(key.contains(-32, 95, 32));
        assert!(!key.contains(0, 64, 32));
        assert!(ChunkKey::parse("1").is_err());
        assert!(ChunkKey::parse("a:1").is_err());
        assert!(ChunkKey::parse("1:2:3").is_err());
    }
}
