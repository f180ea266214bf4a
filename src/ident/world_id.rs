use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;

use crate::err::WorldError;

const NAME: &str = "[A-Za-z0-9_-]+";

fn world_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            "^(?P<a>{NAME})(?::(?P<b>{NAME}))?(?::(?P<c>{NAME}))?(?:!(?P<instance>{NAME}))?$"
        ))
        .expect("world id pattern")
    })
}

fn collection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!("^@(?P<region>{NAME}):(?P<name>{NAME})$")).expect("collection id pattern")
    })
}

/// A parsed world identity.
///
/// Forms: `world`, `region:world`, `region:world:zone`, any of these with a `!instance`
/// suffix, and collection ids `@region:name` / `@public:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct WorldId {
    raw: String,
    region: Option<String>,
    world: String,
    zone: Option<String>,
    instance: Option<String>,
    collection: bool,
}

impl WorldId {
    pub(crate) fn parse(value: &str) -> Result<Self, WorldError> {
        if let Some(caps) = collection_pattern().captures(value) {
            return Ok(Self {
                raw: value.to_string(),
                region: Some(caps["region"].to_string()),
                world: caps["name"].to_string(),
                zone: None,
                instance: None,
                collection: true,
            });
        }
        let caps = world_pattern()
            .captures(value)
            .ok_or_else(|| WorldError::Validation(format!("invalid world id '{value}'")))?;
        let a = caps["a"].to_string();
        let b = caps.name("b").map(|m| m.as_str().to_string());
        let c = caps.name("c").map(|m| m.as_str().to_string());
        let (region, world, zone) = match (b, c) {
            (None, _) => (None, a, None),
            (Some(b), None) => (Some(a), b, None),
            (Some(b), Some(c)) => (Some(a), b, Some(c)),
        };
        Ok(Self {
            raw: value.to_string(),
            region,
            world,
            zone,
            instance: caps.name("instance").map(|m| m.as_str().to_string()),
            collection: false,
        })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    pub(crate) fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub(crate) fn world(&self) -> &str {
        &self.world
    }

    pub(crate) fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub(crate) fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub(crate) fn is_collection(&self) -> bool {
        self.collection
    }

    pub(crate) fn is_instance(&self) -> bool {
        self.instance.is_some()
    }

    /// The instance-stripped id. All layer, chunk and terrain storage is keyed by this.
    pub(crate) fn main_id(&self) -> WorldId {
        if self.instance.is_none() {
            return self.clone();
        }
        let raw = match self.raw.split_once('!') {
            Some((main, _)) => main.to_string(),
            None => self.raw.clone(),
        };
        Self {
            raw,
            instance: None,
            ..self.clone()
        }
    }

    pub(crate) fn with_instance(&self, instance: &str) -> Result<WorldId, WorldError> {
        if self.collection {
            return Err(WorldError::Validation(format!(
                "collection id '{}' can not carry an instance",
                self.raw
            )));
        }
        WorldId::parse(&format!("{}!{instance}", self.main_id().raw))
    }
}

impl Display for WorldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_full_instance_id() {
        let id = WorldId::parse("r1:earth:zone1!sess42").unwrap();
        assert_eq!(id.region(), Some("r1"));
        assert_eq!(id.world(), "earth");
        assert_eq!(id.zone(), Some("zone1"));
        assert_eq!(id.instance(), Some("sess42"));
        assert!(id.is_instance());
        assert_eq!(id.main_id().as_str(), "r1:earth:zone1");
        assert_eq!(id.main_id().instance(), None);
    }

    #[test]
    fn different_instances_share_main_id() {
        let a = WorldId::parse("r1:earth:zone1!sess42").unwrap();
        let b = WorldId::parse("r1:earth:zone1!sess99").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.main_id(), b.main_id());
    }

    #[test]
    fn parses_short_forms() {
        let id = WorldId::parse("w1").unwrap();
        assert_eq!(id.world(), "w1");
        assert_eq!(id.region(), None);
        assert_eq!(id.main_id(), id);

        let id = WorldId::parse("r1:earth").unwrap();
        assert_eq!(id.region(), Some("r1"));
        assert_eq!(id.world(), "earth");
        assert_eq!(id.zone(), None);
    }

    #[test]
    fn parses_collections() {
        let id = WorldId::parse("@public:starter").unwrap();
        assert!(id.is_collection());
        assert_eq!(id.region(), Some("public"));
        assert_eq!(id.world(), "starter");
        assert!(id.with_instance("x").is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "a:b:c:d", "a b", "w1!", "!inst", "@public", "@a:b!c", "w1!a!b", "a::b"] {
            assert!(
                matches!(WorldId::parse(bad), Err(WorldError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn with_instance_replaces_suffix() {
        let id = WorldId::parse("r1:earth!old").unwrap();
        assert_eq!(id.with_instance("new").unwrap().as_str(), "r1:earth!new");
    }
}
