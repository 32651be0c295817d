//! Dedalo KG: dictionary-encoded knowledge graph access
//!
//! The search engine never touches RDF terms directly. Every vertex and edge
//! label is an integer id drawn from one of three dictionaries, mirroring the
//! layout of HDT dumps:
//!
//! - **subjects**: terms that occur in subject position
//! - **predicates**: edge labels
//! - **objects**: terms that occur in object position (IRIs and literals)
//!
//! A term that occurs in both positions has one id per role. Converting a
//! vertex between roles goes through its term string and may fail, e.g. a
//! literal has no subject id.
//!
//! ## Module Organization
//!
//! - `rdf`: N-Triples / Turtle loading into [`MemoryGraph`]
//! - `prefix`: URI shortening for human-readable output

pub mod prefix;
pub mod rdf;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub use prefix::PrefixMap;
pub use rdf::{load_rdf_file, load_rdf_str, RdfSyntax};

// ============================================================================
// Role-typed identifiers
// ============================================================================

/// Subject-role vertex id (4 bytes, never 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Subject(u32);

impl Subject {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Object-role vertex id (4 bytes, never 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Object(u32);

impl Object {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Edge label id (4 bytes, never 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Predicate(u32);

impl Predicate {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dictionary a term id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Subject,
    Predicate,
    Object,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Subject => f.write_str("subject"),
            Role::Predicate => f.write_str("predicate"),
            Role::Object => f.write_str("object"),
        }
    }
}

/// One edge, as returned by [`KnowledgeGraph::triples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Subject,
    pub predicate: Predicate,
    pub object: Object,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported RDF syntax for {} (expected .nt or .ttl)", .path.display())]
    UnsupportedSyntax { path: PathBuf },
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("{}:{line}: expected `abbrev prefix`", .path.display())]
    MalformedPrefix { path: PathBuf, line: usize },
}

// ============================================================================
// Graph access
// ============================================================================

/// Read access to a triple store.
///
/// Implementations are queried synchronously from the search loop; `triples`
/// may be slow on large stores, every other method should be a dictionary
/// lookup.
pub trait KnowledgeGraph {
    /// All edges out of `subject`, optionally restricted to a predicate and/or
    /// an object. `None` acts as a wildcard.
    fn triples(
        &self,
        subject: Subject,
        predicate: Option<Predicate>,
        object: Option<Object>,
    ) -> Vec<Triple>;

    /// External string form of an id in the given role.
    fn term(&self, id: u32, role: Role) -> Option<&str>;

    /// Id of a term in the given role, if the term occurs in that role.
    fn id_of(&self, term: &str, role: Role) -> Option<u32>;

    /// Number of distinct triples.
    fn triple_count(&self) -> usize;

    fn subject(&self, term: &str) -> Option<Subject> {
        self.id_of(term, Role::Subject).map(Subject::new)
    }

    fn predicate(&self, term: &str) -> Option<Predicate> {
        self.id_of(term, Role::Predicate).map(Predicate::new)
    }

    fn object(&self, term: &str) -> Option<Object> {
        self.id_of(term, Role::Object).map(Object::new)
    }

    fn subject_to_object(&self, subject: Subject) -> Option<Object> {
        let term = self.term(subject.raw(), Role::Subject)?;
        self.object(term)
    }

    fn object_to_subject(&self, object: Object) -> Option<Subject> {
        let term = self.term(object.raw(), Role::Object)?;
        self.subject(term)
    }

    /// Objects reachable from `start` by following `predicates` in order.
    ///
    /// Intermediate vertices that do not exist as subjects end their branch.
    /// An empty predicate sequence reaches nothing.
    fn follow(&self, start: Subject, predicates: &[Predicate]) -> RoaringBitmap {
        let mut reached = RoaringBitmap::new();
        let Some((last, hops)) = predicates.split_last() else {
            return reached;
        };

        let mut current = RoaringBitmap::new();
        current.insert(start.raw());

        for &predicate in hops {
            let mut next = RoaringBitmap::new();
            for s in current.iter() {
                for t in self.triples(Subject::new(s), Some(predicate), None) {
                    if let Some(subject) = self.object_to_subject(t.object) {
                        next.insert(subject.raw());
                    }
                }
            }
            current = next;
            if current.is_empty() {
                return reached;
            }
        }

        for s in current.iter() {
            for t in self.triples(Subject::new(s), Some(*last), None) {
                reached.insert(t.object.raw());
            }
        }
        reached
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Term dictionary for one role. Ids are dense and start at 1.
#[derive(Debug, Default)]
struct TermDictionary {
    ids: AHashMap<String, u32>,
    terms: Vec<String>,
}

impl TermDictionary {
    fn intern(&mut self, term: &str) -> u32 {
        if let Some(&id) = self.ids.get(term) {
            return id;
        }
        self.terms.push(term.to_string());
        let id = self.terms.len() as u32;
        self.ids.insert(term.to_string(), id);
        id
    }

    fn id_of(&self, term: &str) -> Option<u32> {
        self.ids.get(term).copied()
    }

    fn term(&self, id: u32) -> Option<&str> {
        let idx = (id as usize).checked_sub(1)?;
        self.terms.get(idx).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.terms.len()
    }
}

/// Accumulates string triples and produces a [`MemoryGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    subjects: TermDictionary,
    predicates: TermDictionary,
    objects: TermDictionary,
    edges: Vec<(u32, u32, u32)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one triple. Duplicates are collapsed by [`GraphBuilder::build`].
    pub fn insert(&mut self, subject: &str, predicate: &str, object: &str) -> &mut Self {
        let s = self.subjects.intern(subject);
        let p = self.predicates.intern(predicate);
        let o = self.objects.intern(object);
        self.edges.push((s, p, o));
        self
    }

    pub fn build(self) -> MemoryGraph {
        let mut adjacency: Vec<Vec<(u32, u32)>> = vec![Vec::new(); self.subjects.len()];
        for (s, p, o) in self.edges {
            adjacency[(s - 1) as usize].push((p, o));
        }

        let mut triple_count = 0;
        for edges in &mut adjacency {
            edges.sort_unstable();
            edges.dedup();
            triple_count += edges.len();
        }

        MemoryGraph {
            subjects: self.subjects,
            predicates: self.predicates,
            objects: self.objects,
            adjacency,
            triple_count,
        }
    }
}

/// Read-only triple store with per-subject adjacency lists.
#[derive(Debug)]
pub struct MemoryGraph {
    subjects: TermDictionary,
    predicates: TermDictionary,
    objects: TermDictionary,
    /// `subject_id - 1 -> sorted (predicate, object)` pairs.
    adjacency: Vec<Vec<(u32, u32)>>,
    triple_count: usize,
}

impl MemoryGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Build a graph from `(subject, predicate, object)` string triples.
    pub fn from_triples<'a>(triples: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        let mut builder = GraphBuilder::new();
        for (s, p, o) in triples {
            builder.insert(s, p, o);
        }
        builder.build()
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn edges_of(&self, subject: Subject) -> &[(u32, u32)] {
        (subject.raw() as usize)
            .checked_sub(1)
            .and_then(|idx| self.adjacency.get(idx))
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }
}

impl KnowledgeGraph for MemoryGraph {
    fn triples(
        &self,
        subject: Subject,
        predicate: Option<Predicate>,
        object: Option<Object>,
    ) -> Vec<Triple> {
        let mut edges = self.edges_of(subject);
        if let Some(p) = predicate {
            let start = edges.partition_point(|&(ep, _)| ep < p.raw());
            let end = edges.partition_point(|&(ep, _)| ep <= p.raw());
            edges = &edges[start..end];
        }

        edges
            .iter()
            .filter(|&&(_, o)| object.map_or(true, |want| want.raw() == o))
            .map(|&(p, o)| Triple {
                subject,
                predicate: Predicate::new(p),
                object: Object::new(o),
            })
            .collect()
    }

    fn term(&self, id: u32, role: Role) -> Option<&str> {
        match role {
            Role::Subject => self.subjects.term(id),
            Role::Predicate => self.predicates.term(id),
            Role::Object => self.objects.term(id),
        }
    }

    fn id_of(&self, term: &str, role: Role) -> Option<u32> {
        match role {
            Role::Subject => self.subjects.id_of(term),
            Role::Predicate => self.predicates.id_of(term),
            Role::Object => self.objects.id_of(term),
        }
    }

    fn triple_count(&self) -> usize {
        self.triple_count
    }
}
