use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use crate::err::WorldError;

/// Dotted numeric version tag stored in a document's `_schema` field.
///
/// Trailing zero components are not significant: `1`, `1.0` and `1.0.0` are equal.
/// An absent tag is the zero version.
#[derive(Debug, Clone)]
pub(crate) struct SchemaVersion {
    parts: Vec<u32>,
    raw: String,
}

impl SchemaVersion {
    pub(crate) fn zero() -> Self {
        Self {
            parts: vec![],
            raw: "0".into(),
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(WorldError::Validation(format!("invalid schema version '{value}'")));
        }
        let mut parts = digits
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| WorldError::Validation(format!("invalid schema version '{value}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        while parts.last() == Some(&0) {
            parts.pop();
        }
        Ok(Self {
            parts,
            raw: digits.to_string(),
        })
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(value: &str) -> SchemaVersion {
        SchemaVersion::parse(value).unwrap()
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("2") > v("1.99"));
        assert!(SchemaVersion::zero() < v("0.0.1"));
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("0"), SchemaVersion::zero());
        assert_eq!(v("0.0"), SchemaVersion::zero());
    }

    #[test]
    fn keeps_spelling_for_display() {
        assert_eq!(v("1.0.0").to_string(), "1.0.0");
        assert_eq!(v("v2.1").to_string(), "2.1");
        assert_eq!(SchemaVersion::zero().to_string(), "0");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "v", "1..2", "a.b", "1.-1"] {
            assert!(SchemaVersion::parse(bad).is_err(), "{bad}");
        }
    }
}
