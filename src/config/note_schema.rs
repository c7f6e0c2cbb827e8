//! `NoteSchema` configuration: per-tag ordered lists of expected/gating notes.
//!
//! Loaded from a YAML file once at process startup and frozen thereafter:
//! a process-wide note-schema registry loaded once and never mutated.

use crate::error::{EngineError, Result};
use crate::model::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One entry in a tag's note schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSchemaEntry {
    pub key: String,
    pub role: Role,
    #[serde(default)]
    pub required: bool,
}

/// The full schema: tag name -> ordered list of expected note entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteSchema {
    #[serde(flatten)]
    by_tag: HashMap<String, Vec<NoteSchemaEntry>>,
}

impl NoteSchema {
    #[must_use]
    pub fn entries_for_tag(&self, tag: &str) -> &[NoteSchemaEntry] {
        self.by_tag.get(tag).map_or(&[], Vec::as_slice)
    }

    /// All schema entries expected for an item carrying `tags`, tag order
    /// preserved, tags de-duplicated by (key, role).
    #[must_use]
    pub fn expected_for_tags(&self, tags: &[String]) -> Vec<NoteSchemaEntry> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for tag in tags {
            for entry in self.entries_for_tag(tag) {
                if seen.insert((entry.key.clone(), entry.role)) {
                    out.push(entry.clone());
                }
            }
        }
        out
    }

    /// Load from a YAML file. A missing file is not an error: it yields an
    /// empty schema (no tags gate anything).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if the file exists but cannot be read
    /// or parsed, or if it names a role outside the four note-bearing
    /// roles (`queue`, `work`, `review`, `terminal`).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("reading {}: {e}", path.display())))?;
        let schema: Self = serde_yaml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("parsing {}: {e}", path.display())))?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        for entries in self.by_tag.values() {
            for entry in entries {
                if entry.role == Role::Blocked {
                    return Err(EngineError::Config(format!(
                        "note schema key '{}' names role 'blocked', which never gates a transition",
                        entry.key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_schema() {
        let schema = NoteSchema::load(Path::new("/nonexistent/note_schema.yaml")).unwrap();
        assert!(schema.expected_for_tags(&["bugfix".into()]).is_empty());
    }

    #[test]
    fn parses_tag_entries() {
        let yaml = "bugfix:\n  - key: root-cause\n    role: work\n    required: true\n";
        let schema: NoteSchema = serde_yaml::from_str(yaml).unwrap();
        schema.validate().unwrap();
        let expected = schema.expected_for_tags(&["bugfix".to_string()]);
        assert_eq!(expected.len(), 1);
        assert_eq!(expected[0].key, "root-cause");
        assert!(expected[0].required);
    }

    #[test]
    fn rejects_blocked_role() {
        let yaml = "bugfix:\n  - key: x\n    role: blocked\n    required: true\n";
        let schema: NoteSchema = serde_yaml::from_str(yaml).unwrap();
        assert!(schema.validate().is_err());
    }
}
