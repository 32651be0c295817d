//! Dedalo search: label-separating path explanations over a knowledge graph
//!
//! Given positive and negative labeled entities, the search grows predicate
//! sequences ("paths") outward from the labels one round at a time, scores
//! every `(path, endpoint)` pair with a fuzzy F1 measure and yields those above
//! a threshold, within time, round and memory budgets.
//!
//! All mutable state (path arena, reachability cache, frontier) is owned by a
//! [`Search`] value, so independent searches can run in one process.
//!
//! ## Module Organization
//!
//! - `labels`: positive / negative example sets and CSV loading
//! - `blacklist`: predicates never followed
//! - `path`: interned path arena with origin/endpoint indices
//! - `reachability`: per-path label reachability with disk spillover
//! - `scoring`: explanations and the fuzzy F-measure
//! - `selection`: heuristics, pruners and frontier selection
//! - `memory`: approximate memory accounting and profiler hooks
//! - `search`: the round-based controller

pub mod blacklist;
pub mod error;
pub mod labels;
pub mod memory;
pub mod path;
pub mod reachability;
pub mod scoring;
pub mod search;
pub mod selection;

use dedalo_kg::KnowledgeGraph;

pub use blacklist::Blacklist;
pub use error::{Result, SearchError};
pub use labels::{Example, LabelOptions, LabelSet};
pub use memory::{profiler, MemoryProfiler, MemoryUsage, NoopProfiler, TracingProfiler};
pub use path::{PathId, PathStore};
pub use reachability::{CacheStats, PathData, ReachabilityCache};
pub use scoring::{Confusion, Explanation, Record};
pub use search::{Outcome, ScoredExplanation, Search, SearchConfig, SearchStats, StopReason};
pub use selection::{
    AnyPruner, GlobalBestScore, Heuristic, MaxPathScore, PathPruner, PruneContext, PrunerConfig,
    Selection,
};

/// The fixed inputs of a search: the graph and the labels.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub graph: &'a dyn KnowledgeGraph,
    pub labels: &'a LabelSet,
}

impl<'a> Scope<'a> {
    pub fn new(graph: &'a dyn KnowledgeGraph, labels: &'a LabelSet) -> Self {
        Self { graph, labels }
    }
}
