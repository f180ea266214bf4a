use std::fmt::{Display, Formatter};

use crate::err::WorldError;

/// Axial hex-grid coordinate used to address world grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HexVector2 {
    pub(crate) q: i32,
    pub(crate) r: i32,
}

const DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

impl HexVector2 {
    pub(crate) fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        let invalid = || WorldError::Validation(format!("invalid hex coordinate '{value}'"));
        let (q, r) = value.split_once(';').ok_or_else(invalid)?;
        Ok(Self {
            q: q.trim().parse().map_err(|_| invalid())?,
            r: r.trim().parse().map_err(|_| invalid())?,
        })
    }

    /// Fails for cells on the edge of the i32 range.
    pub(crate) fn neighbors(&self) -> Result<[HexVector2; 6], WorldError> {
        let mut neighbors = [*self; 6];
        for (neighbor, (dq, dr)) in neighbors.iter_mut().zip(DIRECTIONS) {
            match (self.q.checked_add(dq), self.r.checked_add(dr)) {
                (Some(q), Some(r)) => *neighbor = HexVector2::new(q, r),
                _ => {
                    return Err(WorldError::Validation(format!(
                        "hex cell {self} has no neighbors in range"
                    )))
                }
            }
        }
        Ok(neighbors)
    }

    pub(crate) fn distance(&self, other: &HexVector2) -> i64 {
        let dq = i64::from(self.q) - i64::from(other.q);
        let dr = i64::from(self.r) - i64::from(other.r);
        (dq.abs() + dr.abs() + (dq + dr).abs()) / 2
    }
}

impl Display for HexVector2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};{}", self.q, self.r)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_format() {
        let hex = HexVector2::parse("3;-2").unwrap();
        assert_eq!(hex, HexVector2::new(3, -2));
        assert_eq!(hex.to_string(), "3;-2");
        assert!(HexVector2::parse("3:-2").is_err());
        assert!(HexVector2::parse("x;1").is_err());
    }

    #[test]
    fn neighbors_are_one_step_away() {
        let origin = HexVector2::new(0, 0);
        for n in origin.neighbors().unwrap() {
            assert_eq!(origin.distance(&n), 1);
        }
        assert_eq!(origin.distance(&HexVector2::new(2, -4)), 4);
        assert_eq!(origin.distance(&HexVector2::new(-3, 3)), 3);
    }

    #[test]
    fn edge_cells() {
        assert!(HexVector2::new(i32::MAX, 0).neighbors().is_err());
        let far = HexVector2::new(i32::MIN, 0).distance(&HexVector2::new(i32::MAX, 0));
        assert_eq!(far, u32::MAX as i64);
    }
}
