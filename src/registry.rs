//! The feeder catalog.
//!
//! [`FeederRegistry`] holds every known feeder independent of where it is
//! mounted, keyed by id and kept in insertion order. It is backed 1:1 by a
//! JSON array of [`FeederRecord`]s.
//!
//! Loading is tolerant: a missing file is an empty registry, and a malformed
//! file is an empty registry plus a warning. The controller topology file is
//! handled strictly instead (see [`crate::topology`]).

use crate::feeder::{Feeder, FeederRecord, FeederSnapshot};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a feeder with id '{0}' already exists")]
    DuplicateId(String),

    #[error("no feeder with id '{0}'")]
    NotFound(String),

    #[error("feeder id must not be empty")]
    EmptyId,

    #[error("failed to write feeder registry '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize feeder registry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// In-memory catalog of feeders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeederRegistry {
    feeders: Vec<Feeder>,
}

impl FeederRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.feeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeders.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Feeder> {
        self.feeders.iter().find(|f| f.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Feeder> {
        self.feeders.iter_mut().find(|f| f.id() == id)
    }

    /// Add a new feeder called `id`.
    ///
    /// With a `template` that exists, the new feeder starts as a copy of its
    /// persisted configuration; an unknown or absent template starts from
    /// defaults.
    pub fn create(&mut self, id: &str, template: Option<&str>) -> RegistryResult<&mut Feeder> {
        self.check_new_id(id)?;

        let feeder = match template.and_then(|t| self.get(t)) {
            Some(source) => source.duplicate(id),
            None => {
                if let Some(missing) = template {
                    warn!("Template feeder '{}' not found; creating '{}' from defaults", missing, id);
                }
                Feeder::new(id)
            }
        };

        Ok(self.push(feeder))
    }

    /// Copy `source_id` into a new feeder `new_id`.
    ///
    /// `new_id` is checked first, so a collision is reported even when the
    /// source is also missing. The registry is unchanged on error.
    pub fn clone_feeder(&mut self, source_id: &str, new_id: &str) -> RegistryResult<&mut Feeder> {
        self.check_new_id(new_id)?;
        let copy = self
            .get(source_id)
            .ok_or_else(|| RegistryError::NotFound(source_id.to_string()))?
            .duplicate(new_id);
        Ok(self.push(copy))
    }

    /// Insert an already-built feeder.
    pub fn insert(&mut self, feeder: Feeder) -> RegistryResult<&mut Feeder> {
        self.check_new_id(feeder.id())?;
        Ok(self.push(feeder))
    }

    pub fn delete(&mut self, id: &str) -> RegistryResult<Feeder> {
        let index = self
            .feeders
            .iter()
            .position(|f| f.id() == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(self.feeders.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feeder> {
        self.feeders.iter()
    }

    /// Persisted view of every feeder, in insertion order.
    pub fn list(&self) -> Vec<FeederRecord> {
        self.feeders.iter().map(Feeder::to_record).collect()
    }

    /// Full view of every feeder, including transient session state.
    pub fn list_full(&self) -> Vec<FeederSnapshot> {
        self.feeders.iter().map(Feeder::snapshot).collect()
    }

    /// Load a registry from `path`, never failing.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Feeder file {} not found; starting with an empty registry", path.display());
                return Self::new();
            }
            Err(e) => {
                warn!("Could not read feeder file {}: {}; starting with an empty registry", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Vec<FeederRecord>>(&content) {
            Ok(records) => Self::from_records(records),
            Err(e) => {
                warn!("Malformed feeder file {}: {}; starting with an empty registry", path.display(), e);
                Self::new()
            }
        }
    }

    /// Build a registry from records, keeping the first of any duplicated id.
    pub fn from_records(records: impl IntoIterator<Item = FeederRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            if let Err(e) = registry.insert(Feeder::from_record(record)) {
                warn!("Skipping feeder record: {}", e);
            }
        }
        registry
    }

    /// Write every feeder's persisted fields to `path` as a JSON array.
    ///
    /// An empty registry is not written.
    pub fn save(&self, path: impl AsRef<Path>) -> RegistryResult<()> {
        let path = path.as_ref();
        if self.is_empty() {
            info!("No feeders to save; leaving {} untouched", path.display());
            return Ok(());
        }
        self.write(path)
    }

    /// Write the catalog to `path` even when it is empty, so that deleting
    /// the last feeder reaches the disk.
    pub fn write(&self, path: impl AsRef<Path>) -> RegistryResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.list())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| RegistryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Saved {} feeder(s) to {}", self.len(), path.display());
        Ok(())
    }

    fn check_new_id(&self, id: &str) -> RegistryResult<()> {
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        if self.contains(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, feeder: Feeder) -> &mut Feeder {
        self.feeders.push(feeder);
        let last = self.feeders.len() - 1;
        &mut self.feeders[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::AngleValue;
    use pretty_assertions::assert_eq;

    fn sample() -> FeederRegistry {
        let mut registry = FeederRegistry::new();
        let feeder = registry.create("F1", None).unwrap();
        feeder.model = Some("0816".into());
        feeder.set_advance_angle(180);
        feeder.settle_time = Some(480);
        registry.create("F2", None).unwrap();
        registry
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let mut registry = sample();
        assert!(matches!(registry.create("F1", None), Err(RegistryError::DuplicateId(id)) if id == "F1"));
        assert!(matches!(registry.create("  ", None), Err(RegistryError::EmptyId)));
    }

    #[test]
    fn test_create_from_template_copies_configuration() {
        let mut registry = sample();
        registry.get_mut("F1").unwrap().set_current_angle(AngleValue::normalize(33));

        let created = registry.create("F3", Some("F1")).unwrap();
        assert_eq!(created.model.as_deref(), Some("0816"));
        assert_eq!(created.advance_angle(), Some(AngleValue::normalize(180)));
        assert_eq!(created.current_angle(), None);

        let blank = registry.create("F4", Some("missing")).unwrap();
        assert_eq!(blank.model, None);
    }

    #[test]
    fn test_clone_checks_new_id_first() {
        let mut registry = sample();
        let before = registry.clone();

        assert!(matches!(registry.clone_feeder("nope", "F2"), Err(RegistryError::DuplicateId(_))));
        assert!(matches!(registry.clone_feeder("nope", "F9"), Err(RegistryError::NotFound(_))));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_delete_and_order() {
        let mut registry = sample();
        registry.create("F3", None).unwrap();
        let removed = registry.delete("F2").unwrap();
        assert_eq!(removed.id(), "F2");
        assert!(matches!(registry.delete("F2"), Err(RegistryError::NotFound(_))));

        let ids: Vec<String> = registry.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["F1".to_string(), "F3".to_string()]);
    }

    #[test]
    fn test_from_records_keeps_first_duplicate() {
        let mut first = Feeder::new("F1");
        first.model = Some("first".into());
        let mut second = Feeder::new("F1");
        second.model = Some("second".into());

        let registry = FeederRegistry::from_records(vec![first.to_record(), second.to_record()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("F1").unwrap().model.as_deref(), Some("first"));
    }
}
