//! Positive / negative labeled entities.

use std::fs;
use std::path::Path;

use dedalo_kg::{KnowledgeGraph, Subject};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SearchError};

/// One labeled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Example {
    pub subject: Subject,
    pub positive: bool,
}

impl Example {
    pub fn positive(subject: Subject) -> Self {
        Self {
            subject,
            positive: true,
        }
    }

    pub fn negative(subject: Subject) -> Self {
        Self {
            subject,
            positive: false,
        }
    }
}

/// Options for [`LabelSet::from_csv`].
#[derive(Debug, Clone)]
pub struct LabelOptions {
    /// Group id of the positive class. Defaults to the first row's group.
    pub group_id: Option<String>,
    pub delimiter: char,
    /// Keep only the first `n` examples per class (0 = keep all).
    pub truncate: usize,
    /// Cut both classes down to the smaller class size (after truncation).
    pub balance: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            group_id: None,
            delimiter: ',',
            truncate: 0,
            balance: false,
        }
    }
}

/// Two disjoint classes of labeled entities.
///
/// Insertion order is kept so that truncation and balancing are
/// deterministic. Subject bitmaps mirror the lists for set arithmetic during
/// scoring.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    positives: Vec<Example>,
    negatives: Vec<Example>,
    positive_ids: RoaringBitmap,
    negative_ids: RoaringBitmap,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from subject lists; duplicates collapse as in [`LabelSet::add`].
    pub fn from_subjects(
        positives: impl IntoIterator<Item = Subject>,
        negatives: impl IntoIterator<Item = Subject>,
    ) -> Self {
        let mut labels = Self::new();
        for s in positives {
            labels.add(Example::positive(s));
        }
        for s in negatives {
            labels.add(Example::negative(s));
        }
        labels
    }

    /// Add an example. Returns `false` if the entity is already labeled in
    /// either class.
    pub fn add(&mut self, example: Example) -> bool {
        let id = example.subject.raw();
        if self.positive_ids.contains(id) || self.negative_ids.contains(id) {
            return false;
        }
        if example.positive {
            self.positive_ids.insert(id);
            self.positives.push(example);
        } else {
            self.negative_ids.insert(id);
            self.negatives.push(example);
        }
        true
    }

    pub fn positives(&self) -> &[Example] {
        &self.positives
    }

    pub fn negatives(&self) -> &[Example] {
        &self.negatives
    }

    pub fn positive_ids(&self) -> &RoaringBitmap {
        &self.positive_ids
    }

    pub fn negative_ids(&self) -> &RoaringBitmap {
        &self.negative_ids
    }

    /// The example for a subject, if it is labeled.
    pub fn example_for(&self, subject: Subject) -> Option<Example> {
        if self.positive_ids.contains(subject.raw()) {
            Some(Example::positive(subject))
        } else if self.negative_ids.contains(subject.raw()) {
            Some(Example::negative(subject))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positives first, then negatives.
    pub fn iter(&self) -> impl Iterator<Item = &Example> + '_ {
        self.positives.iter().chain(self.negatives.iter())
    }

    /// Keep the first `n` examples of each class.
    pub fn truncate(&mut self, n: usize) {
        self.positives.truncate(n);
        self.negatives.truncate(n);
        self.reindex();
    }

    /// Cut both classes to the size of the smaller one.
    pub fn balance(&mut self) {
        let m = self.positives.len().min(self.negatives.len());
        self.truncate(m);
    }

    fn reindex(&mut self) {
        self.positive_ids = self.positives.iter().map(|e| e.subject.raw()).collect();
        self.negative_ids = self.negatives.iter().map(|e| e.subject.raw()).collect();
    }

    /// Load labels from a delimited file with rows `group, uri, ...`.
    ///
    /// URIs may be wrapped in angle brackets. URIs that are not subjects in
    /// `graph` are skipped with a warning.
    pub fn from_csv(path: &Path, graph: &dyn KnowledgeGraph, options: &LabelOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(SearchError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut group_id = options.group_id.clone();
        if let Some(g) = &group_id {
            info!(group = %g, "positive example group id set");
        }

        let mut labels = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split(options.delimiter);
            let (Some(group), Some(uri)) = (cols.next(), cols.next()) else {
                return Err(SearchError::MalformedLabelRow {
                    path: path.to_path_buf(),
                    line: i + 1,
                });
            };
            let group = group.trim();

            let positive_group = group_id.get_or_insert_with(|| {
                info!(group = %group, "positive example group id not set, using first row");
                group.to_string()
            });
            let positive = same_group(group, positive_group.as_str());

            let uri = uri.trim();
            let uri = uri.strip_prefix('<').unwrap_or(uri);
            let uri = uri.strip_suffix('>').unwrap_or(uri);
            match graph.subject(uri) {
                Some(subject) => {
                    labels.add(Example { subject, positive });
                }
                None => warn!(uri = %uri, line = i + 1, "label does not exist as subject, skipping"),
            }
        }

        if options.truncate > 0 {
            labels.truncate(options.truncate);
        }
        if options.balance {
            labels.balance();
        }
        if labels.positives.is_empty() {
            return Err(SearchError::NoPositiveLabels);
        }

        info!(
            positives = labels.positives.len(),
            negatives = labels.negatives.len(),
            "loaded labels"
        );
        Ok(labels)
    }
}

/// Group ids compare as integers when both sides are integers (`01` is `1`),
/// as strings otherwise.
fn same_group(a: &str, b: &str) -> bool {
    match (a.parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b.trim(),
    }
}
