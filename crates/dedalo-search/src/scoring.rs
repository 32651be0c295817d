//! Explanation scoring (fuzzy F1 against the label set).

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use dedalo_kg::Object;
use roaring::RoaringBitmap;
use serde::Serialize;

use crate::error::Result;
use crate::path::{PathId, PathStore};
use crate::reachability::ReachabilityCache;
use crate::Scope;

/// Counts attached to a scored explanation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Record {
    pub score: f64,
    pub num_examples: usize,
    pub num_positives: usize,
    pub num_connected_positives: u64,
    pub num_connected_negatives: u64,
}

/// Hypothesis: entities reaching `endpoint` via `path` are positive.
///
/// Equality, hashing and ordering only consider `(path, endpoint)`.
#[derive(Debug, Clone, Copy)]
pub struct Explanation {
    pub path: PathId,
    pub endpoint: Object,
    pub record: Option<Record>,
}

impl Explanation {
    pub fn new(path: PathId, endpoint: Object) -> Self {
        Self {
            path,
            endpoint,
            record: None,
        }
    }

    fn key(&self) -> (PathId, Object) {
        (self.path, self.endpoint)
    }
}

impl PartialEq for Explanation {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Explanation {}

impl Hash for Explanation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Explanation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Explanation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// True positives, false positives and false negatives of a root set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl Confusion {
    pub fn new(roots: &RoaringBitmap, positives: &RoaringBitmap) -> Self {
        let tp = roots.intersection_len(positives);
        Self {
            tp,
            fp: roots.len() - tp,
            fn_: positives.len() - tp,
        }
    }

    pub fn precision(&self) -> f64 {
        if self.tp == 0 {
            return 0.0;
        }
        self.tp as f64 / (self.tp + self.fp) as f64
    }

    pub fn recall(&self) -> f64 {
        if self.tp == 0 {
            return 0.0;
        }
        self.tp as f64 / (self.tp + self.fn_) as f64
    }

    pub fn f_measure(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }
}

/// Fuzzy F1 of a set of root subjects.
pub fn fuzzy_f_measure(roots: &RoaringBitmap, positives: &RoaringBitmap) -> f64 {
    Confusion::new(roots, positives).f_measure()
}

/// Labeled subjects that reach the explanation's endpoint via its path.
pub fn explains(
    scope: Scope<'_>,
    paths: &PathStore,
    cache: &mut ReachabilityCache,
    explanation: &Explanation,
) -> Result<RoaringBitmap> {
    let data = cache.load_or_compute(scope.graph, scope.labels, paths, explanation.path)?;
    Ok(data
        .object_examples
        .get(&explanation.endpoint.raw())
        .map(|examples| examples.iter().map(|e| e.subject.raw()).collect())
        .unwrap_or_default())
}

pub fn score(
    scope: Scope<'_>,
    paths: &PathStore,
    cache: &mut ReachabilityCache,
    explanation: &Explanation,
) -> Result<f64> {
    let roots = explains(scope, paths, cache, explanation)?;
    Ok(fuzzy_f_measure(&roots, scope.labels.positive_ids()))
}

/// Best score any explanation on `path` could reach: every positive entity
/// connected via the path, and no negatives.
pub fn max_possible_score(
    scope: Scope<'_>,
    paths: &PathStore,
    cache: &mut ReachabilityCache,
    path: PathId,
) -> Result<f64> {
    let roots: RoaringBitmap = cache
        .connected_examples(scope.graph, scope.labels, paths, path)?
        .into_iter()
        .filter(|e| e.positive)
        .map(|e| e.subject.raw())
        .collect();
    Ok(fuzzy_f_measure(&roots, scope.labels.positive_ids()))
}

/// Score a batch, attach records and raise each path's watermark.
///
/// Returns the best score in the batch, or `None` for an empty batch.
pub fn evaluate(
    scope: Scope<'_>,
    paths: &mut PathStore,
    cache: &mut ReachabilityCache,
    explanations: &mut [Explanation],
) -> Result<Option<f64>> {
    let positives = scope.labels.positive_ids();
    let mut best: Option<f64> = None;

    for explanation in explanations.iter_mut() {
        let roots = explains(scope, paths, cache, explanation)?;
        let confusion = Confusion::new(&roots, positives);
        let score = confusion.f_measure();

        explanation.record = Some(Record {
            score,
            num_examples: scope.labels.len(),
            num_positives: scope.labels.positives().len(),
            num_connected_positives: confusion.tp,
            num_connected_negatives: confusion.fp,
        });
        paths.raise_max_score(explanation.path, score);
        best = Some(best.map_or(score, |b| b.max(score)));
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bitmap(ids: &[u32]) -> RoaringBitmap {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_confusion_counts() {
        let c = Confusion::new(&bitmap(&[1, 2, 5]), &bitmap(&[1, 2, 3]));
        assert_eq!(c, Confusion { tp: 2, fp: 1, fn_: 1 });
        assert_relative_eq!(c.precision(), 2.0 / 3.0);
        assert_relative_eq!(c.recall(), 2.0 / 3.0);
        assert_relative_eq!(c.f_measure(), 2.0 / 3.0);
    }

    #[test]
    fn test_perfect_and_disjoint() {
        let positives = bitmap(&[1, 2, 3]);
        assert_relative_eq!(fuzzy_f_measure(&positives, &positives), 1.0);
        assert_relative_eq!(fuzzy_f_measure(&bitmap(&[4, 5]), &positives), 0.0);
        assert_relative_eq!(fuzzy_f_measure(&RoaringBitmap::new(), &positives), 0.0);
    }

    #[test]
    fn test_explanation_identity_ignores_record() {
        let mut a = Explanation::new(PathId::EMPTY, Object::new(3));
        let b = Explanation::new(PathId::EMPTY, Object::new(3));
        a.record = Some(Record {
            score: 1.0,
            num_examples: 1,
            num_positives: 1,
            num_connected_positives: 1,
            num_connected_negatives: 0,
        });
        assert_eq!(a, b);
        assert!(Explanation::new(PathId::EMPTY, Object::new(2)) < b);
    }

    #[test]
    fn test_single_score_agrees_with_batch() {
        use crate::labels::LabelSet;
        use dedalo_kg::{KnowledgeGraph, MemoryGraph};

        let mut triples = Vec::new();
        for s in ["A", "B", "C"] {
            triples.push((s, "likes", "X"));
        }
        for s in ["D", "E"] {
            triples.push((s, "likes", "Y"));
        }
        for s in ["A", "B", "C", "D", "E"] {
            triples.push((s, "type", "Person"));
        }
        let g = MemoryGraph::from_triples(triples);
        let subject = |t: &str| g.subject(t).unwrap();
        let labels = LabelSet::from_subjects(
            [subject("A"), subject("B"), subject("C")],
            [subject("D"), subject("E")],
        );
        let scope = Scope::new(&g, &labels);

        let mut paths = PathStore::new();
        let likes = paths.intern(PathId::EMPTY, g.predicate("likes").unwrap());
        let typed = paths.intern(PathId::EMPTY, g.predicate("type").unwrap());
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ReachabilityCache::new(None, dir.path()).unwrap();

        let to_x = Explanation::new(likes, g.object("X").unwrap());
        let to_person = Explanation::new(typed, g.object("Person").unwrap());
        let single_x = score(scope, &paths, &mut cache, &to_x).unwrap();
        let single_person = score(scope, &paths, &mut cache, &to_person).unwrap();
        assert_relative_eq!(single_x, 1.0);
        assert_relative_eq!(single_person, 0.75);

        let mut batch = [to_x, to_person];
        let best = evaluate(scope, &mut paths, &mut cache, &mut batch).unwrap();
        assert_eq!(best, Some(1.0));
        assert_relative_eq!(batch[0].record.unwrap().score, single_x);
        assert_relative_eq!(batch[1].record.unwrap().score, single_person);
        assert_eq!(batch[1].record.unwrap().num_connected_negatives, 2);
        assert_relative_eq!(paths.max_score(typed), 0.75);
    }
}
