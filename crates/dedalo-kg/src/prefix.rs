//! URI shortening (`http://xmlns.com/foaf/0.1/name` → `foaf:name`).

use std::fs;
use std::path::Path;

use crate::GraphError;

/// Ordered `(abbrev, prefix)` pairs.
#[derive(Debug, Clone, Default)]
pub struct PrefixMap {
    entries: Vec<(String, String)>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a whitespace-separated two-column file: `abbrev prefix`.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut map = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split_whitespace();
            let (Some(abbrev), Some(prefix)) = (cols.next(), cols.next()) else {
                return Err(GraphError::MalformedPrefix {
                    path: path.to_path_buf(),
                    line: i + 1,
                });
            };
            map.insert(abbrev.trim_end_matches(':'), prefix);
        }
        Ok(map)
    }

    pub fn insert(&mut self, abbrev: &str, prefix: &str) {
        self.entries.retain(|(a, _)| a != abbrev);
        self.entries.push((abbrev.to_string(), prefix.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the longest matching prefix with `abbrev:`. Unmatched terms are
    /// returned unchanged.
    pub fn shorten(&self, term: &str) -> String {
        let best = self
            .entries
            .iter()
            .filter(|(_, prefix)| !prefix.is_empty() && term.starts_with(prefix.as_str()))
            .max_by_key(|(_, prefix)| prefix.len());
        match best {
            Some((abbrev, prefix)) => format!("{abbrev}:{}", &term[prefix.len()..]),
            None => term.to_string(),
        }
    }

    /// Inverse of [`PrefixMap::shorten`] for `abbrev:local` forms.
    pub fn expand(&self, text: &str) -> String {
        if let Some((abbrev, local)) = text.split_once(':') {
            if let Some((_, prefix)) = self.entries.iter().find(|(a, _)| a == abbrev) {
                return format!("{prefix}{local}");
            }
        }
        text.to_string()
    }
}
