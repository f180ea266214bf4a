use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::err::WorldError;
use crate::ident::chunk_key::ChunkKey;

/// Axis-aligned block region `x,y,z,sizeX,sizeY,sizeZ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Area {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: i32,
    pub(crate) size_x: i32,
    pub(crate) size_y: i32,
    pub(crate) size_z: i32,
}

/// Upper bound on the chunks one area may address.
pub(crate) const MAX_AREA_CHUNKS: i64 = 4096;

impl Area {
    pub(crate) fn new(x: i32, y: i32, z: i32, size_x: i32, size_y: i32, size_z: i32) -> Self {
        Self { x, y, z, size_x, size_y, size_z }
    }

    /// Sizes must be positive and the far corner must fit in `i32`.
    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        let invalid = || WorldError::Validation(format!("invalid area '{value}'"));
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<i32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let [x, y, z, size_x, size_y, size_z] = parts[..] else {
            return Err(invalid());
        };
        if size_x <= 0 || size_y <= 0 || size_z <= 0 {
            return Err(invalid());
        }
        for (start, size) in [(x, size_x), (y, size_y), (z, size_z)] {
            start.checked_add(size - 1).ok_or_else(invalid)?;
        }
        Ok(Self::new(x, y, z, size_x, size_y, size_z))
    }

    pub(crate) fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        within(x, self.x, self.size_x) && within(y, self.y, self.size_y) && within(z, self.z, self.size_z)
    }

    /// Every chunk the area overlaps. Fails with `Validation` beyond `MAX_AREA_CHUNKS`.
    pub(crate) fn chunk_keys(&self, chunk_size: i32) -> Result<BTreeSet<ChunkKey>, WorldError> {
        let size = i64::from(chunk_size);
        let span = |start: i32, len: i32| {
            let first = i64::from(start).div_euclid(size);
            let last = (i64::from(start) + i64::from(len) - 1).div_euclid(size);
            (first, last)
        };
        let (min_cx, max_cx) = span(self.x, self.size_x);
        let (min_cz, max_cz) = span(self.z, self.size_z);
        let count = (max_cx - min_cx + 1) * (max_cz - min_cz + 1);
        if count > MAX_AREA_CHUNKS {
            return Err(WorldError::Validation(format!(
                "area {self} covers {count} chunks, at most {MAX_AREA_CHUNKS} allowed"
            )));
        }
        let mut keys = BTreeSet::new();
        for cx in min_cx..=max_cx {
            for cz in min_cz..=max_cz {
                keys.insert(ChunkKey::new(cx as i32, cz as i32));
            }
        }
        Ok(keys)
    }
}

fn within(value: i32, start: i32, len: i32) -> bool {
    let value = i64::from(value);
    let start = i64::from(start);
    value >= start && value < start + i64::from(len)
}

impl Display for Area {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.x, self.y, self.z, self.size_x, self.size_y, self.size_z
        )
    }
}
