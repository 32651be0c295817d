//! Path identity store.
//!
//! A path is a predicate sequence, stored as an arena record that points at
//! its one-shorter prefix. Interning on `(prefix, last predicate)` gives every
//! distinct sequence exactly one [`PathId`] for the lifetime of the store.
//!
//! Each record also threads two indices over the current search:
//!
//! - `endpoint_origins`: reached object -> labeled subjects it was reached from
//! - `origin_endpoints`: labeled subject -> objects it reaches
//!
//! so that origin lookups on long paths never re-trace from the labels.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use ahash::AHashMap;
use dedalo_kg::{KnowledgeGraph, Object, Predicate, PrefixMap, Role, Subject};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// Handle into a [`PathStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PathId(u32);

impl PathId {
    /// The zero-length root path.
    pub const EMPTY: PathId = PathId(0);

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct PathNode {
    prefix: Option<PathId>,
    predicate: Option<Predicate>,
    len: usize,
    endpoint_origins: BTreeMap<u32, RoaringBitmap>,
    origin_endpoints: BTreeMap<u32, RoaringBitmap>,
    max_score_found: f64,
    retired: bool,
}

impl PathNode {
    fn root() -> Self {
        Self {
            prefix: None,
            predicate: None,
            len: 0,
            endpoint_origins: BTreeMap::new(),
            origin_endpoints: BTreeMap::new(),
            max_score_found: 0.0,
            retired: false,
        }
    }

    fn index_bytes(&self) -> usize {
        const ENTRY_OVERHEAD: usize = 32;
        self.endpoint_origins
            .values()
            .chain(self.origin_endpoints.values())
            .map(|b| b.serialized_size() + ENTRY_OVERHEAD)
            .sum()
    }
}

/// Arena of interned paths.
///
/// `PathId`s are only meaningful for the store that issued them.
#[derive(Debug)]
pub struct PathStore {
    nodes: Vec<PathNode>,
    intern: AHashMap<(PathId, Predicate), PathId>,
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStore {
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode::root()],
            intern: AHashMap::new(),
        }
    }

    fn node(&self, id: PathId) -> &PathNode {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: PathId) -> &mut PathNode {
        &mut self.nodes[id.index()]
    }

    /// The path `base` followed by `predicate`, created on first request.
    ///
    /// A new path starts with the watermark of its prefix.
    pub fn intern(&mut self, base: PathId, predicate: Predicate) -> PathId {
        if let Some(&id) = self.intern.get(&(base, predicate)) {
            return id;
        }
        let prefix = self.node(base);
        let node = PathNode {
            prefix: Some(base),
            predicate: Some(predicate),
            len: prefix.len + 1,
            endpoint_origins: BTreeMap::new(),
            origin_endpoints: BTreeMap::new(),
            max_score_found: prefix.max_score_found,
            retired: false,
        };
        let id = PathId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.intern.insert((base, predicate), id);
        id
    }

    /// Intern `base + predicate` and record that the edge
    /// `(subject, predicate, object)` extends it.
    ///
    /// For a length-1 path `subject` is itself the origin. Otherwise the
    /// origins recorded for `subject` under `base` are carried over to
    /// `object`; a subject that has no object role or no recorded origins
    /// contributes nothing.
    pub fn extend(
        &mut self,
        graph: &dyn KnowledgeGraph,
        base: PathId,
        subject: Subject,
        predicate: Predicate,
        object: Object,
    ) -> PathId {
        let id = self.intern(base, predicate);
        if self.node(id).len == 1 {
            let node = self.node_mut(id);
            node.endpoint_origins
                .entry(object.raw())
                .or_default()
                .insert(subject.raw());
            node.origin_endpoints
                .entry(subject.raw())
                .or_default()
                .insert(object.raw());
            return id;
        }

        let origins = graph
            .subject_to_object(subject)
            .and_then(|o| self.node(base).endpoint_origins.get(&o.raw()))
            .filter(|origins| !origins.is_empty())
            .cloned();
        let Some(origins) = origins else {
            return id;
        };

        let node = self.node_mut(id);
        for origin in origins.iter() {
            node.origin_endpoints
                .entry(origin)
                .or_default()
                .insert(object.raw());
        }
        *node.endpoint_origins.entry(object.raw()).or_default() |= origins;
        id
    }

    /// Number of interned paths, the empty path included.
    pub fn path_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self, id: PathId) -> usize {
        self.node(id).len
    }

    /// Predicates in traversal order, first hop first.
    pub fn predicates(&self, id: PathId) -> Vec<Predicate> {
        let mut out = Vec::with_capacity(self.len(id));
        let mut cur = id;
        while let Some(p) = self.node(cur).predicate {
            out.push(p);
            cur = match self.node(cur).prefix {
                Some(prefix) => prefix,
                None => break,
            };
        }
        out.reverse();
        out
    }

    /// Stable name for the path: `-`-joined predicate ids, or `empty-path`.
    pub fn key(&self, id: PathId) -> String {
        let predicates = self.predicates(id);
        if predicates.is_empty() {
            return "empty-path".to_string();
        }
        predicates
            .iter()
            .map(|p| p.raw().to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Objects reached so far along this path.
    pub fn end_points(&self, id: PathId) -> impl Iterator<Item = Object> + '_ {
        self.node(id)
            .endpoint_origins
            .keys()
            .map(|&o| Object::new(o))
    }

    pub fn end_point_count(&self, id: PathId) -> usize {
        self.node(id).endpoint_origins.len()
    }

    /// Labeled subjects that reach `endpoint` along this path.
    pub fn origins_of(&self, id: PathId, endpoint: Object) -> Option<&RoaringBitmap> {
        self.node(id).endpoint_origins.get(&endpoint.raw())
    }

    /// Objects reached from `origin` along this path.
    pub fn endpoints_of(&self, id: PathId, origin: Subject) -> Option<&RoaringBitmap> {
        self.node(id).origin_endpoints.get(&origin.raw())
    }

    pub fn max_score(&self, id: PathId) -> f64 {
        self.node(id).max_score_found
    }

    /// Raise the watermark; lower scores are ignored.
    pub fn raise_max_score(&mut self, id: PathId, score: f64) {
        let node = self.node_mut(id);
        if score > node.max_score_found {
            node.max_score_found = score;
        }
    }

    /// Mark a path as expanded or pruned.
    pub fn retire(&mut self, id: PathId) {
        self.node_mut(id).retired = true;
    }

    pub fn is_retired(&self, id: PathId) -> bool {
        self.node(id).retired
    }

    /// Drop the indices of a retired path. Returns the approximate number of
    /// bytes released.
    pub fn release_indices(&mut self, id: PathId) -> usize {
        let node = self.node_mut(id);
        if !node.retired {
            return 0;
        }
        let freed = node.index_bytes();
        node.endpoint_origins = BTreeMap::new();
        node.origin_endpoints = BTreeMap::new();
        freed
    }

    /// Drop the indices of every retired path. Returns the approximate
    /// number of bytes released.
    pub fn release_retired(&mut self) -> usize {
        (0..self.nodes.len() as u32)
            .map(|raw| self.release_indices(PathId(raw)))
            .sum()
    }

    /// Approximate bytes held by the origin/endpoint indices of all paths.
    pub fn approx_bytes(&self) -> usize {
        self.nodes.iter().map(PathNode::index_bytes).sum()
    }

    /// Lexicographic order of the predicate sequences.
    pub fn compare_sequences(&self, a: PathId, b: PathId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.predicates(a).cmp(&self.predicates(b))
    }

    /// Human-readable form: predicate terms joined by ` -> `.
    pub fn describe(&self, id: PathId, graph: &dyn KnowledgeGraph, prefixes: &PrefixMap) -> String {
        self.predicates(id)
            .iter()
            .map(|p| match graph.term(p.raw(), Role::Predicate) {
                Some(term) => prefixes.shorten(term),
                None => p.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
