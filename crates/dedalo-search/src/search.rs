//! Round-based search controller.
//!
//! Each round expands one path: every frontier vertex's outgoing edges extend
//! that path by one predicate, the new `(path, endpoint)` pairs are scored,
//! and the path selector picks the next path to expand. Qualifying
//! explanations are handed out one at a time through [`Iterator`].
//!
//! Deadlines, round limits, memory limits and cancellation all end the stream
//! gracefully; explanations already yielded stay valid.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use dedalo_kg::{KnowledgeGraph, Predicate, Role, Subject};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::blacklist::Blacklist;
use crate::error::{Result, SearchError};
use crate::labels::LabelSet;
use crate::memory::{MemoryProfiler, MemoryUsage};
use crate::path::{PathId, PathStore};
use crate::reachability::{CacheStats, ReachabilityCache};
use crate::scoring::{evaluate, Explanation, Record};
use crate::selection::{select_next, Heuristic, PathPruner, PruneContext};
use crate::Scope;

const PROGRESS_MIN_VERTICES: usize = 10_000;
const PROGRESS_EVERY: usize = 1_000;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub heuristic: Heuristic,
    /// Wall-clock budget measured from [`Search::new`]. `None` = unlimited.
    pub runtime: Option<Duration>,
    pub rounds: Option<usize>,
    /// Byte budget for path indices plus in-memory cache entries.
    pub memlimit: Option<usize>,
    /// Only explanations scoring strictly above this are yielded.
    pub minimum_score: f64,
    /// Explore every path up to this length, then stop. 0 = off.
    pub complete: usize,
    /// Maximum in-memory reachability entries. `None` = unbounded.
    pub cache_capacity: Option<usize>,
    /// Parent directory of the spill directory.
    pub spill_parent: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            heuristic: Heuristic::default(),
            runtime: None,
            rounds: None,
            memlimit: None,
            minimum_score: -1.0,
            complete: 0,
            cache_capacity: None,
            spill_parent: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    FrontierExhausted,
    NoSurvivingPath,
    Deadline,
    RoundLimit,
    Complete,
    MemoryLimit,
    Cancelled,
    /// A reachability spill failed; see [`Search::take_error`].
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Done(StopReason),
    Aborted(StopReason),
}

impl Outcome {
    pub fn reason(&self) -> StopReason {
        match *self {
            Outcome::Done(reason) | Outcome::Aborted(reason) => reason,
        }
    }
}

/// One yielded explanation with its record and predicate sequence.
#[derive(Debug, Clone)]
pub struct ScoredExplanation {
    pub explanation: Explanation,
    pub predicates: Vec<Predicate>,
    pub record: Record,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub rounds: usize,
    /// Explanations built, duplicates included.
    pub explanations_created: usize,
    pub explanations_yielded: usize,
    pub paths_interned: usize,
    pub cache: CacheStats,
}

/// The search itself; iterate it to receive explanations.
pub struct Search<'g> {
    graph: &'g dyn KnowledgeGraph,
    labels: &'g LabelSet,
    blacklist: &'g Blacklist,
    pruner: Box<dyn PathPruner + 'g>,
    profiler: Box<dyn MemoryProfiler + 'g>,
    config: SearchConfig,

    paths: PathStore,
    cache: ReachabilityCache,
    /// Live candidate paths, ordered by creation.
    frontier: BTreeSet<PathId>,
    best_path: Option<PathId>,
    nodes: Vec<Subject>,
    shortest_surviving: usize,
    deadline: Option<Instant>,
    blacklisted: AHashMap<Predicate, bool>,

    pending: VecDeque<ScoredExplanation>,
    outcome: Option<Outcome>,
    error: Option<SearchError>,
    cancel: Arc<AtomicBool>,
    stats: SearchStats,
}

impl<'g> Search<'g> {
    /// Validate the inputs and prepare the root round.
    pub fn new(
        graph: &'g dyn KnowledgeGraph,
        labels: &'g LabelSet,
        blacklist: &'g Blacklist,
        pruner: Box<dyn PathPruner + 'g>,
        profiler: Box<dyn MemoryProfiler + 'g>,
        config: SearchConfig,
    ) -> Result<Self> {
        if labels.positives().is_empty() {
            return Err(SearchError::NoPositiveLabels);
        }
        if config.minimum_score.is_nan() {
            return Err(SearchError::InvalidConfig(
                "minimum score must be a number".to_string(),
            ));
        }
        let cache = ReachabilityCache::new(config.cache_capacity, &config.spill_parent)?;

        info!(
            heuristic = %config.heuristic,
            pruner = %pruner.name(),
            positives = labels.positives().len(),
            negatives = labels.negatives().len(),
            "starting search"
        );

        let nodes = labels.iter().map(|e| e.subject).collect();
        let deadline = config.runtime.map(|d| Instant::now() + d);
        Ok(Self {
            graph,
            labels,
            blacklist,
            pruner,
            profiler,
            config,
            paths: PathStore::new(),
            cache,
            frontier: BTreeSet::new(),
            best_path: Some(PathId::EMPTY),
            nodes,
            shortest_surviving: 0,
            deadline,
            blacklisted: AHashMap::new(),
            pending: VecDeque::new(),
            outcome: None,
            error: None,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: SearchStats::default(),
        })
    }

    /// Flag that stops the search at the next checkpoint when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// How the search ended, once it has.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// The error behind `Aborted(Failed)`.
    pub fn take_error(&mut self) -> Option<SearchError> {
        self.error.take()
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            paths_interned: self.paths.path_count(),
            cache: self.cache.stats(),
            ..self.stats
        }
    }

    /// Directory holding spilled reachability entries; removed on drop.
    pub fn spill_dir(&self) -> &Path {
        self.cache.spill_dir()
    }

    pub fn paths(&self) -> &PathStore {
        &self.paths
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage {
            path_bytes: self.paths.approx_bytes(),
            cache_bytes: self.cache.approx_bytes(),
            cached_paths: self.cache.cached_paths(),
            spilled_paths: self.cache.spilled_paths(),
            frontier_paths: self.frontier.len(),
        }
    }

    fn scope(&self) -> Scope<'g> {
        Scope::new(self.graph, self.labels)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn finish(&mut self, outcome: Outcome) {
        debug!(?outcome, explanations = self.stats.explanations_created, "search finished");
        self.outcome = Some(outcome);
    }

    fn is_blacklisted(&mut self, predicate: Predicate) -> bool {
        if self.blacklist.is_empty() {
            return false;
        }
        if let Some(&hit) = self.blacklisted.get(&predicate) {
            return hit;
        }
        let hit = self
            .graph
            .term(predicate.raw(), Role::Predicate)
            .is_some_and(|term| self.blacklist.is_blacklisted(term));
        self.blacklisted.insert(predicate, hit);
        hit
    }

    /// Reason to stop before the next round, if any.
    fn stop_reason(&self) -> Option<StopReason> {
        if self.cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.deadline_passed() {
            return Some(StopReason::Deadline);
        }
        if self.config.rounds.is_some_and(|max| self.stats.rounds >= max) {
            return Some(StopReason::RoundLimit);
        }
        if self.config.complete > 0 && self.shortest_surviving >= self.config.complete {
            return Some(StopReason::Complete);
        }
        None
    }

    /// Follow the outgoing edges of every frontier vertex along `base`.
    fn expand(&mut self, base: PathId) -> BTreeSet<Explanation> {
        let mut found = BTreeSet::new();
        let nodes = std::mem::take(&mut self.nodes);
        let round = self.stats.rounds + 1;

        'vertices: for (i, &node) in nodes.iter().enumerate() {
            if nodes.len() > PROGRESS_MIN_VERTICES && i % PROGRESS_EVERY == 0 {
                debug!(round, percent = i * 100 / nodes.len(), "round progress");
            }
            if self.cancelled() {
                break;
            }
            for triple in self.graph.triples(node, None, None) {
                if self.is_blacklisted(triple.predicate) {
                    continue;
                }
                let path = self.paths.extend(
                    self.graph,
                    base,
                    triple.subject,
                    triple.predicate,
                    triple.object,
                );
                if !self.paths.is_retired(path) {
                    self.frontier.insert(path);
                }
                found.insert(Explanation::new(path, triple.object));
                self.stats.explanations_created += 1;

                if self.deadline_passed() {
                    debug!(round, "runtime limit reached mid-round");
                    break 'vertices;
                }
            }
        }
        found
    }

    fn score_and_queue(&mut self, found: BTreeSet<Explanation>) -> Result<()> {
        let mut batch: Vec<Explanation> = found.into_iter().collect();
        let scope = self.scope();
        let best = evaluate(scope, &mut self.paths, &mut self.cache, &mut batch)?;
        if let Some(best) = best {
            self.pruner.observe(best);
        }

        for explanation in batch {
            let Some(record) = explanation.record else {
                continue;
            };
            if record.score > self.config.minimum_score {
                self.pending.push_back(ScoredExplanation {
                    explanation,
                    predicates: self.paths.predicates(explanation.path),
                    record,
                });
                self.stats.explanations_yielded += 1;
            }
        }
        Ok(())
    }

    /// Sample memory; past the limit, reclaim once and report whether the
    /// limit is still exceeded.
    fn memory_exceeded(&mut self) -> Result<bool> {
        let usage = self.memory_usage();
        self.profiler.sample(self.stats.rounds, &usage);
        let Some(limit) = self.config.memlimit else {
            return Ok(false);
        };
        if usage.total_bytes() < limit {
            return Ok(false);
        }

        let spilled = self.cache.spill_all(&self.paths)?;
        let released = self.paths.release_retired();
        let usage = self.memory_usage();
        debug!(spilled, released, bytes = usage.total_bytes(), limit, "reclaimed memory");
        Ok(usage.total_bytes() > limit)
    }

    /// Run one round. Sets `outcome` when the search ends.
    fn step(&mut self) -> Result<()> {
        let Some(base) = self.best_path else {
            self.finish(Outcome::Done(StopReason::NoSurvivingPath));
            return Ok(());
        };
        if let Some(reason) = self.stop_reason() {
            self.finish(Outcome::Done(reason));
            return Ok(());
        }

        let round = self.stats.rounds + 1;
        let started = Instant::now();
        let usage = self.memory_usage();
        self.profiler.sample(round, &usage);
        debug!(round, path = %self.paths.key(base), vertices = self.nodes.len(), "round start");

        let complete = self.config.complete;
        if complete == 0 || self.paths.len(base) < complete {
            let found = self.expand(base);
            if !found.is_empty() {
                self.score_and_queue(found)?;
            }
        }

        self.frontier.remove(&base);
        self.paths.retire(base);
        self.stats.rounds = round;

        let exceeded = self.memory_exceeded()?;
        debug!(round, elapsed = ?started.elapsed(), bytes = self.memory_usage().total_bytes(), "round done");
        if exceeded {
            self.finish(Outcome::Aborted(StopReason::MemoryLimit));
            return Ok(());
        }

        if self.frontier.is_empty() {
            self.finish(Outcome::Done(StopReason::FrontierExhausted));
            return Ok(());
        }
        if complete > 0 {
            self.shortest_surviving = self
                .frontier
                .iter()
                .map(|&p| self.paths.len(p))
                .min()
                .unwrap_or(0);
            if self.shortest_surviving >= complete {
                self.finish(Outcome::Done(StopReason::Complete));
                return Ok(());
            }
        }

        let max_length = (complete > 0).then(|| complete - 1);
        let scope = self.scope();
        let selection = {
            let mut ctx = PruneContext {
                scope,
                paths: &self.paths,
                cache: &mut self.cache,
            };
            select_next(
                &mut ctx,
                &mut self.frontier,
                self.config.heuristic,
                self.pruner.as_ref(),
                max_length,
            )?
        };
        for &path in &selection.removed {
            self.paths.retire(path);
        }

        let Some(next) = selection.next else {
            self.best_path = None;
            self.finish(Outcome::Done(StopReason::NoSurvivingPath));
            return Ok(());
        };
        let graph = self.graph;
        let nodes: BTreeSet<Subject> = self
            .paths
            .end_points(next)
            .filter_map(|o| graph.object_to_subject(o))
            .collect();
        self.nodes = nodes.into_iter().collect();
        self.best_path = Some(next);
        Ok(())
    }
}

impl Iterator for Search<'_> {
    type Item = ScoredExplanation;

    fn next(&mut self) -> Option<ScoredExplanation> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.outcome.is_some() {
                return None;
            }
            if let Err(err) = self.step() {
                error!(error = %err, "search failed");
                self.error = Some(err);
                self.finish(Outcome::Aborted(StopReason::Failed));
            }
        }
    }
}
