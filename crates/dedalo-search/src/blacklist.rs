//! Predicates the search must never follow.

use std::fs;
use std::path::Path;

use ahash::AHashSet;
use dedalo_kg::PrefixMap;

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    items: AHashSet<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a newline-delimited list of predicate IRIs.
    ///
    /// Blank lines and `#` comments are ignored. Entries written as
    /// `abbrev:local` are expanded through `prefixes`.
    pub fn from_file(path: &Path, prefixes: &PrefixMap) -> Result<Self> {
        if !path.is_file() {
            return Err(SearchError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut blacklist = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix('<').unwrap_or(line);
            let line = line.strip_suffix('>').unwrap_or(line);
            blacklist.insert(&prefixes.expand(line));
        }
        Ok(blacklist)
    }

    pub fn insert(&mut self, item: &str) {
        self.items.insert(item.trim().to_string());
    }

    pub fn is_blacklisted(&self, item: &str) -> bool {
        self.items.contains(item.trim())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
