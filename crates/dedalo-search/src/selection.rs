//! Path selection: pruning plus a heuristic ranking of the frontier.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::labels::LabelSet;
use crate::path::{PathId, PathStore};
use crate::reachability::ReachabilityCache;
use crate::scoring::max_possible_score;
use crate::Scope;

// ============================================================================
// Heuristics
// ============================================================================

/// Ranking of frontier paths. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Heuristic {
    #[default]
    ShortestPathFirst,
    LongestPathFirst,
    Entropy,
}

impl Heuristic {
    pub fn score(&self, paths: &PathStore, labels: &LabelSet, path: PathId) -> f64 {
        match self {
            Heuristic::ShortestPathFirst => -(paths.len(path) as f64),
            Heuristic::LongestPathFirst => paths.len(path) as f64,
            Heuristic::Entropy => entropy(paths, labels, path),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Heuristic::ShortestPathFirst => "shortest-path-first",
            Heuristic::LongestPathFirst => "longest-path-first",
            Heuristic::Entropy => "entropy",
        }
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Heuristic {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shortest-path-first" | "spf" | "bfs" => Ok(Heuristic::ShortestPathFirst),
            "longest-path-first" | "lpf" => Ok(Heuristic::LongestPathFirst),
            "entropy" => Ok(Heuristic::Entropy),
            _ => Err(SearchError::UnknownHeuristic(s.to_string())),
        }
    }
}

/// `-Σ frac·log10(frac)` over the path's endpoints, where `frac` is the share
/// of labeled entities reaching that endpoint.
fn entropy(paths: &PathStore, labels: &LabelSet, path: PathId) -> f64 {
    let total = labels.len() as f64;
    if total == 0.0 {
        return 0.0;
    }
    paths
        .end_points(path)
        .filter_map(|o| paths.origins_of(path, o))
        .map(|origins| origins.len() as f64 / total)
        .filter(|&frac| frac > 0.0)
        .map(|frac| -frac * frac.log10())
        .sum()
}

// ============================================================================
// Pruners
// ============================================================================

/// Everything a pruner may consult.
pub struct PruneContext<'a> {
    pub scope: Scope<'a>,
    pub paths: &'a PathStore,
    pub cache: &'a mut ReachabilityCache,
}

/// Decides whether a frontier path is worth keeping.
pub trait PathPruner {
    fn should_prune(&self, ctx: &mut PruneContext<'_>, path: PathId) -> Result<bool>;

    /// Best score of a freshly scored batch.
    fn observe(&mut self, _best_score: f64) {}

    fn name(&self) -> String;
}

fn dominates(bound: f64, projected: f64, strict: bool) -> bool {
    if strict {
        bound > projected
    } else {
        bound >= projected
    }
}

/// Prune when the path's own watermark already reaches its best possible score.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxPathScore {
    pub strict: bool,
}

impl PathPruner for MaxPathScore {
    fn should_prune(&self, ctx: &mut PruneContext<'_>, path: PathId) -> Result<bool> {
        let projected = max_possible_score(ctx.scope, ctx.paths, ctx.cache, path)?;
        let found = ctx.paths.max_score(path);
        Ok(dominates(found, projected, self.strict))
    }

    fn name(&self) -> String {
        format!("max-path-score(strict={})", self.strict)
    }
}

/// Prune when the best score seen on any path reaches the path's best
/// possible score.
#[derive(Debug, Clone, Copy)]
pub struct GlobalBestScore {
    pub strict: bool,
    best: f64,
}

impl GlobalBestScore {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            best: f64::NEG_INFINITY,
        }
    }
}

impl PathPruner for GlobalBestScore {
    fn should_prune(&self, ctx: &mut PruneContext<'_>, path: PathId) -> Result<bool> {
        if self.best == f64::NEG_INFINITY {
            return Ok(false);
        }
        let projected = max_possible_score(ctx.scope, ctx.paths, ctx.cache, path)?;
        Ok(dominates(self.best, projected, self.strict))
    }

    fn observe(&mut self, best_score: f64) {
        if best_score > self.best {
            self.best = best_score;
        }
    }

    fn name(&self) -> String {
        format!("global-best-score(strict={})", self.strict)
    }
}

/// Logical OR over child pruners. Empty means "never prune".
#[derive(Default)]
pub struct AnyPruner {
    pruners: Vec<Box<dyn PathPruner>>,
}

impl AnyPruner {
    pub fn new(pruners: Vec<Box<dyn PathPruner>>) -> Self {
        Self { pruners }
    }

    pub fn from_configs(configs: &[PrunerConfig]) -> Self {
        Self::new(configs.iter().map(PrunerConfig::build).collect())
    }

    pub fn len(&self) -> usize {
        self.pruners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pruners.is_empty()
    }
}

impl PathPruner for AnyPruner {
    fn should_prune(&self, ctx: &mut PruneContext<'_>, path: PathId) -> Result<bool> {
        for pruner in &self.pruners {
            if pruner.should_prune(ctx, path)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn observe(&mut self, best_score: f64) {
        for pruner in &mut self.pruners {
            pruner.observe(best_score);
        }
    }

    fn name(&self) -> String {
        let names: Vec<String> = self.pruners.iter().map(|p| p.name()).collect();
        format!("any[{}]", names.join(", "))
    }
}

/// Pruning strategy chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PrunerConfig {
    MaxPathScore { strict: bool },
    GlobalBestScore { strict: bool },
}

impl PrunerConfig {
    pub fn build(&self) -> Box<dyn PathPruner> {
        match *self {
            PrunerConfig::MaxPathScore { strict } => Box::new(MaxPathScore { strict }),
            PrunerConfig::GlobalBestScore { strict } => Box::new(GlobalBestScore::new(strict)),
        }
    }

    /// Pruners enabled at an aggressiveness level: 0 none, 1 the per-path
    /// watermark, 2 and up additionally the global best.
    pub fn for_level(level: u8, strict: bool) -> Vec<PrunerConfig> {
        let mut configs = Vec::new();
        if level >= 1 {
            configs.push(PrunerConfig::MaxPathScore { strict });
        }
        if level >= 2 {
            configs.push(PrunerConfig::GlobalBestScore { strict });
        }
        configs
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Result of one scan over the frontier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub next: Option<PathId>,
    /// Paths removed from the frontier during the scan.
    pub removed: Vec<PathId>,
    pub pruned: usize,
    pub too_long: usize,
}

/// Pick the highest-ranked surviving frontier path.
///
/// Paths longer than `max_length` or rejected by `pruner` are removed from
/// `frontier`. Ties go to the lexicographically smaller predicate sequence.
pub fn select_next(
    ctx: &mut PruneContext<'_>,
    frontier: &mut BTreeSet<PathId>,
    heuristic: Heuristic,
    pruner: &dyn PathPruner,
    max_length: Option<usize>,
) -> Result<Selection> {
    debug!(paths = frontier.len(), "evaluating frontier");
    let mut selection = Selection::default();
    let mut best_score = f64::NEG_INFINITY;

    for &path in frontier.iter() {
        if max_length.is_some_and(|max| ctx.paths.len(path) > max) {
            selection.removed.push(path);
            selection.too_long += 1;
            continue;
        }
        if pruner.should_prune(ctx, path)? {
            selection.removed.push(path);
            selection.pruned += 1;
            continue;
        }

        let score = heuristic.score(ctx.paths, ctx.scope.labels, path);
        let better = match selection.next {
            None => true,
            Some(current) => {
                score > best_score
                    || (score == best_score
                        && ctx.paths.compare_sequences(path, current) == Ordering::Less)
            }
        };
        if better {
            best_score = score;
            selection.next = Some(path);
        }
    }

    for path in &selection.removed {
        frontier.remove(path);
    }
    debug!(
        pruned = selection.pruned,
        too_long = selection.too_long,
        remaining = frontier.len(),
        "frontier scan complete"
    );
    Ok(selection)
}
