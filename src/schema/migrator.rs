use std::io::{Read, Write};

use crate::err::WorldError;
use crate::schema::version::SchemaVersion;
use crate::storage::document::{self, Document};

/// One step of an entity type's schema chain.
///
/// A migrator only transforms content. Rewriting the `_schema` tag after the step is the
/// migration service's job.
pub(crate) trait SchemaMigrator: Send + Sync {
    fn entity_type(&self) -> &str;

    fn from_version(&self) -> SchemaVersion;

    fn to_version(&self) -> SchemaVersion;

    fn migrate(&self, document: &str) -> Result<String, WorldError>;

    /// Stream form used for blob-backed entities. Defaults to buffering the whole input.
    fn migrate_stream(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), WorldError> {
        let mut document = String::new();
        input.read_to_string(&mut document)?;
        let migrated = self.migrate(&document)?;
        output.write_all(migrated.as_bytes())?;
        Ok(())
    }
}

type Transform = Box<dyn Fn(&mut Document) -> Result<(), WorldError> + Send + Sync>;

/// Migrator built from a closure over the parsed JSON object.
pub(crate) struct JsonMigrator {
    entity_type: String,
    from: SchemaVersion,
    to: SchemaVersion,
    transform: Transform,
}

impl JsonMigrator {
    pub(crate) fn new(
        entity_type: &str,
        from: &str,
        to: &str,
        transform: impl Fn(&mut Document) -> Result<(), WorldError> + Send + Sync + 'static,
    ) -> Result<Self, WorldError> {
        Ok(Self {
            entity_type: entity_type.to_string(),
            from: SchemaVersion::parse(from)?,
            to: SchemaVersion::parse(to)?,
            transform: Box::new(transform),
        })
    }
}

impl SchemaMigrator for JsonMigrator {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn from_version(&self) -> SchemaVersion {
        self.from.clone()
    }

    fn to_version(&self) -> SchemaVersion {
        self.to.clone()
    }

    fn migrate(&self, raw: &str) -> Result<String, WorldError> {
        let mut doc = document::parse(raw)?;
        (self.transform)(&mut doc)?;
        document::to_string(&doc)
    }
}

#[cfg(test)]
mod test {
    use serde_json::Value;

    use super::*;

    #[test]
    fn json_migrator_and_default_stream() {
        let migrator = JsonMigrator::new("Layer", "0", "1.0.0", |doc| {
            doc.insert("enabled".into(), Value::Bool(true));
            Ok(())
        })
        .unwrap();
        assert_eq!(migrator.migrate(r#"{"_id":"a"}"#).unwrap(), r#"{"_id":"a","enabled":true}"#);

        let mut out = Vec::new();
        migrator
            .migrate_stream(&mut r#"{"_id":"b"}"#.as_bytes(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"_id":"b","enabled":true}"#);
    }

    #[test]
    fn transform_errors_propagate() {
        let migrator = JsonMigrator::new("Layer", "0", "1", |_| {
            Err(WorldError::Migration("boom".into()))
        })
        .unwrap();
        assert!(matches!(migrator.migrate("{}"), Err(WorldError::Migration(_))));
        assert!(matches!(migrator.migrate("[]"), Err(WorldError::Serde(_))));
    }
}
