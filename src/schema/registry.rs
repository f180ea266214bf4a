use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::err::WorldError;
use crate::schema::migrator::SchemaMigrator;
use crate::schema::version::SchemaVersion;

/// Migrators grouped by entity type, each group ordered by version. Built once at startup.
pub(crate) struct MigratorRegistry {
    by_type: HashMap<String, Vec<Arc<dyn SchemaMigrator>>>,
}

impl MigratorRegistry {
    pub(crate) fn new(migrators: Vec<Arc<dyn SchemaMigrator>>) -> Result<Self, WorldError> {
        let mut by_type: HashMap<String, Vec<Arc<dyn SchemaMigrator>>> = HashMap::new();
        for migrator in migrators {
            if migrator.to_version() <= migrator.from_version() {
                return Err(WorldError::Validation(format!(
                    "migrator for {} goes from {} to {}; it must move forward",
                    migrator.entity_type(),
                    migrator.from_version(),
                    migrator.to_version()
                )));
            }
            by_type
                .entry(migrator.entity_type().to_string())
                .or_default()
                .push(migrator);
        }
        for (entity_type, migrators) in by_type.iter_mut() {
            migrators.sort_by(|a, b| {
                a.from_version()
                    .cmp(&b.from_version())
                    .then_with(|| a.to_version().cmp(&b.to_version()))
            });
            debug!("Registered {} migrators for {entity_type}", migrators.len());
        }
        Ok(Self { by_type })
    }

    /// Highest `to` version registered for the type, `None` when the type has no migrators
    /// (documents of that type are left alone).
    pub(crate) fn latest_version(&self, entity_type: &str) -> Option<SchemaVersion> {
        self.by_type
            .get(entity_type)?
            .iter()
            .map(|migrator| migrator.to_version())
            .max()
    }

    pub(crate) fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort();
        types
    }

    /// Greedy chain walk from `from` towards `to`.
    ///
    /// Fails when the walk gets stuck below `to`. A chain that jumps past `to` without
    /// landing on it is discarded with a warning and yields an empty path.
    pub(crate) fn find_migration_path(
        &self,
        entity_type: &str,
        from: &SchemaVersion,
        to: &SchemaVersion,
    ) -> Result<Vec<Arc<dyn SchemaMigrator>>, WorldError> {
        let Some(migrators) = self.by_type.get(entity_type) else {
            return Ok(vec![]);
        };
        let mut path = Vec::new();
        let mut current = from.clone();
        while current < *to {
            let next = migrators
                .iter()
                .find(|migrator| migrator.from_version() == current)
                .ok_or_else(|| {
                    WorldError::Migration(format!(
                        "no migrator for {entity_type} starting at {current} (target {to})"
                    ))
                })?;
            current = next.to_version();
            path.push(next.clone());
        }
        if current != *to {
            warn!(
                "Migration chain for {entity_type} from {from} overshoots target {to} (lands on {current}); ignoring it"
            );
            return Ok(vec![]);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::migrator::JsonMigrator;

    fn step(entity: &str, from: &str, to: &str) -> Arc<dyn SchemaMigrator> {
        Arc::new(JsonMigrator::new(entity, from, to, |_| Ok(())).unwrap())
    }

    fn versions(path: &[Arc<dyn SchemaMigrator>]) -> Vec<String> {
        path.iter()
            .map(|m| format!("{}->{}", m.from_version(), m.to_version()))
            .collect()
    }

    #[test]
    fn walks_chain_registered_out_of_order() {
        let registry = MigratorRegistry::new(vec![
            step("Layer", "2", "3"),
            step("Layer", "0", "1"),
            step("Model", "0", "5"),
            step("Layer", "1", "2"),
        ])
        .unwrap();
        assert_eq!(registry.latest_version("Layer"), Some(SchemaVersion::parse("3").unwrap()));
        assert_eq!(registry.latest_version("Terrain"), None);
        assert_eq!(registry.entity_types(), vec!["Layer", "Model"]);

        let path = registry
            .find_migration_path("Layer", &SchemaVersion::zero(), &SchemaVersion::parse("3").unwrap())
            .unwrap();
        assert_eq!(versions(&path), vec!["0->1", "1->2", "2->3"]);

        let path = registry
            .find_migration_path(
                "Layer",
                &SchemaVersion::parse("1").unwrap(),
                &SchemaVersion::parse("2").unwrap(),
            )
            .unwrap();
        assert_eq!(versions(&path), vec!["1->2"]);
    }

    #[test]
    fn already_at_target_is_empty() {
        let registry = MigratorRegistry::new(vec![step("Layer", "0", "1")]).unwrap();
        let one = SchemaVersion::parse("1").unwrap();
        assert!(registry.find_migration_path("Layer", &one, &one).unwrap().is_empty());
        let newer = SchemaVersion::parse("4").unwrap();
        assert!(registry.find_migration_path("Layer", &newer, &one).unwrap().is_empty());
    }

    #[test]
    fn gap_in_chain_is_an_error() {
        let registry =
            MigratorRegistry::new(vec![step("Layer", "0", "1"), step("Layer", "2", "3")]).unwrap();
        let result = registry.find_migration_path(
            "Layer",
            &SchemaVersion::zero(),
            &SchemaVersion::parse("3").unwrap(),
        );
        assert!(matches!(result, Err(WorldError::Migration(_))));
    }

    #[test]
    fn overshoot_yields_empty_path() {
        let registry =
            MigratorRegistry::new(vec![step("Layer", "0", "1"), step("Layer", "1", "3")]).unwrap();
        let path = registry
            .find_migration_path("Layer", &SchemaVersion::zero(), &SchemaVersion::parse("2").unwrap())
            .unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn backwards_migrator_is_rejected() {
        assert!(MigratorRegistry::new(vec![step("Layer", "2", "1")]).is_err());
        assert!(MigratorRegistry::new(vec![step("Layer", "1", "1.0")]).is_err());
    }
}
