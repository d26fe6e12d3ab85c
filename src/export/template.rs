use std::path::PathBuf;

use log::warn;

use crate::error::ConfigError;

/// Marker replaced by the feature table's display name.
pub const NAME_MARKER: &str = "{}";

/// Output filename pattern, e.g. `out_{}.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    pattern: String,
}

impl NameTemplate {
    /// Validate a filename pattern.
    ///
    /// A pattern without the marker is accepted, but every table exported with
    /// it writes to the same file and the last one wins.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if pattern.trim().is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        match pattern.matches(NAME_MARKER).count() {
            0 => warn!("filename '{pattern}' has no '{NAME_MARKER}' marker; exports of different tables will overwrite each other"),
            1 => {}
            _ => return Err(ConfigError::MultipleMarkers(pattern.to_string())),
        }
        Ok(NameTemplate {
            pattern: pattern.to_string(),
        })
    }

    pub fn has_marker(&self) -> bool {
        self.pattern.contains(NAME_MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Path for the table called `table_name`.
    pub fn resolve(&self, table_name: &str) -> PathBuf {
        PathBuf::from(self.pattern.replace(NAME_MARKER, table_name))
    }
}
