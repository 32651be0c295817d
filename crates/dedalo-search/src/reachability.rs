//! Reachability cache: which labeled entities reach which endpoints via a path.
//!
//! Entries are computed lazily by tracing a path from every labeled entity,
//! kept in memory up to a configurable entry count, and spilled to a
//! process-scoped directory on eviction. A spilled entry is reloaded, never
//! recomputed. The directory is removed when the cache is dropped.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use dedalo_kg::{KnowledgeGraph, Object, Predicate};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::labels::{Example, LabelSet};
use crate::path::{PathId, PathStore};

/// Bidirectional label/endpoint index for one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathData {
    pub predicates: Vec<Predicate>,
    /// Labeled entity -> objects it reaches. Entities reaching nothing are absent.
    pub example_objects: BTreeMap<Example, RoaringBitmap>,
    /// Reached object -> labeled entities reaching it.
    pub object_examples: BTreeMap<u32, BTreeSet<Example>>,
}

impl PathData {
    /// Trace `predicates` from every labeled entity.
    pub fn compute(graph: &dyn KnowledgeGraph, labels: &LabelSet, predicates: Vec<Predicate>) -> Self {
        let mut example_objects = BTreeMap::new();
        let mut object_examples: BTreeMap<u32, BTreeSet<Example>> = BTreeMap::new();

        for &example in labels.iter() {
            let reached = graph.follow(example.subject, &predicates);
            if reached.is_empty() {
                continue;
            }
            for o in reached.iter() {
                object_examples.entry(o).or_default().insert(example);
            }
            example_objects.insert(example, reached);
        }

        Self {
            predicates,
            example_objects,
            object_examples,
        }
    }

    pub fn approx_bytes(&self) -> usize {
        const ENTRY_OVERHEAD: usize = 48;
        let forward: usize = self
            .example_objects
            .values()
            .map(|b| b.serialized_size() + ENTRY_OVERHEAD)
            .sum();
        let reverse: usize = self
            .object_examples
            .values()
            .map(|set| set.len() * std::mem::size_of::<Example>() + ENTRY_OVERHEAD)
            .sum();
        forward + reverse + self.predicates.len() * std::mem::size_of::<Predicate>()
    }
}

/// Counters reported with memory samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub loads: u64,
    pub computes: u64,
    pub evictions: u64,
}

/// FIFO-bounded in-memory cache of [`PathData`] with disk overflow.
#[derive(Debug)]
pub struct ReachabilityCache {
    memory: AHashMap<PathId, PathData>,
    /// Insertion order of the entries in `memory`, oldest first.
    order: VecDeque<PathId>,
    capacity: Option<usize>,
    spill_dir: TempDir,
    spilled: AHashSet<PathId>,
    memory_bytes: usize,
    stats: CacheStats,
}

impl ReachabilityCache {
    /// Create a cache holding at most `capacity` entries in memory
    /// (`None` = unbounded), spilling into a fresh `.path-data-*` directory
    /// under `spill_parent`.
    pub fn new(capacity: Option<usize>, spill_parent: &Path) -> Result<Self> {
        if capacity == Some(0) {
            return Err(SearchError::InvalidConfig(
                "reachability cache capacity must be at least 1".to_string(),
            ));
        }
        let spill_dir = tempfile::Builder::new()
            .prefix(".path-data-")
            .tempdir_in(spill_parent)
            .map_err(|source| SearchError::Spill {
                path: spill_parent.to_path_buf(),
                source,
            })?;
        debug!(dir = %spill_dir.path().display(), "created reachability spill directory");

        Ok(Self {
            memory: AHashMap::new(),
            order: VecDeque::new(),
            capacity,
            spill_dir,
            spilled: AHashSet::new(),
            memory_bytes: 0,
            stats: CacheStats::default(),
        })
    }

    pub fn spill_dir(&self) -> &Path {
        self.spill_dir.path()
    }

    fn file_name(&self, paths: &PathStore, path: PathId) -> PathBuf {
        self.spill_dir.path().join(paths.key(path))
    }

    /// The index for `path`, from memory, disk or a fresh trace, in that order.
    pub fn load_or_compute(
        &mut self,
        graph: &dyn KnowledgeGraph,
        labels: &LabelSet,
        paths: &PathStore,
        path: PathId,
    ) -> Result<&PathData> {
        if self.memory.contains_key(&path) {
            self.stats.hits += 1;
            return Ok(&self.memory[&path]);
        }

        let data = match self.from_storage(paths, path)? {
            Some(data) => {
                self.stats.loads += 1;
                data
            }
            None => {
                self.stats.computes += 1;
                PathData::compute(graph, labels, paths.predicates(path))
            }
        };
        self.admit(paths, path, data)
    }

    fn admit(&mut self, paths: &PathStore, path: PathId, data: PathData) -> Result<&PathData> {
        if let Some(capacity) = self.capacity {
            while self.memory.len() >= capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.evict(paths, oldest)?;
            }
        }
        self.memory_bytes += data.approx_bytes();
        self.order.push_back(path);
        Ok(self.memory.entry(path).or_insert(data))
    }

    fn evict(&mut self, paths: &PathStore, path: PathId) -> Result<()> {
        let Some(data) = self.memory.remove(&path) else {
            return Ok(());
        };
        self.memory_bytes = self.memory_bytes.saturating_sub(data.approx_bytes());
        self.stats.evictions += 1;
        self.to_storage(paths, path, &data)
    }

    fn to_storage(&mut self, paths: &PathStore, path: PathId, data: &PathData) -> Result<()> {
        if self.spilled.contains(&path) {
            return Ok(());
        }
        let file = self.file_name(paths, path);
        let bytes = bincode::serialize(data)?;
        fs::write(&file, bytes).map_err(|source| SearchError::Spill { path: file, source })?;
        self.spilled.insert(path);
        Ok(())
    }

    fn from_storage(&self, paths: &PathStore, path: PathId) -> Result<Option<PathData>> {
        if !self.spilled.contains(&path) {
            return Ok(None);
        }
        let file = self.file_name(paths, path);
        let bytes = fs::read(&file).map_err(|source| SearchError::Spill { path: file, source })?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    /// Move every in-memory entry to disk. Returns the approximate bytes freed.
    pub fn spill_all(&mut self, paths: &PathStore) -> Result<usize> {
        let before = self.memory_bytes;
        while let Some(oldest) = self.order.pop_front() {
            self.evict(paths, oldest)?;
        }
        debug!(freed = before, spilled = self.spilled.len(), "spilled reachability cache");
        Ok(before.saturating_sub(self.memory_bytes))
    }

    /// Labeled entities reaching any endpoint via `path`.
    pub fn connected_examples(
        &mut self,
        graph: &dyn KnowledgeGraph,
        labels: &LabelSet,
        paths: &PathStore,
        path: PathId,
    ) -> Result<BTreeSet<Example>> {
        let data = self.load_or_compute(graph, labels, paths, path)?;
        Ok(data.example_objects.keys().copied().collect())
    }

    /// Labeled entities reaching `endpoint` via `path`.
    pub fn connected_examples_to(
        &mut self,
        graph: &dyn KnowledgeGraph,
        labels: &LabelSet,
        paths: &PathStore,
        path: PathId,
        endpoint: Object,
    ) -> Result<BTreeSet<Example>> {
        let data = self.load_or_compute(graph, labels, paths, path)?;
        match data.object_examples.get(&endpoint.raw()) {
            Some(examples) => Ok(examples.clone()),
            None => Err(SearchError::EndpointNotReached {
                path: paths.key(path),
                endpoint: endpoint.raw(),
            }),
        }
    }

    /// Endpoints reached by any labeled entity via `path`.
    pub fn connected_objects(
        &mut self,
        graph: &dyn KnowledgeGraph,
        labels: &LabelSet,
        paths: &PathStore,
        path: PathId,
    ) -> Result<RoaringBitmap> {
        let data = self.load_or_compute(graph, labels, paths, path)?;
        Ok(data.object_examples.keys().copied().collect())
    }

    pub fn contains_in_memory(&self, path: PathId) -> bool {
        self.memory.contains_key(&path)
    }

    pub fn is_spilled(&self, path: PathId) -> bool {
        self.spilled.contains(&path)
    }

    pub fn cached_paths(&self) -> usize {
        self.memory.len()
    }

    pub fn spilled_paths(&self) -> usize {
        self.spilled.len()
    }

    pub fn approx_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
