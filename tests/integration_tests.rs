//! Integration tests for the complete Dedalo pipeline
//!
//! These tests exercise the crates together:
//! - RDF text/files → `MemoryGraph`
//! - label and blacklist files → `LabelSet` / `Blacklist`
//! - `Search` → scored explanations
//!
//! Run with: cargo test --test integration_tests

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use dedalo_kg::{load_rdf_file, load_rdf_str, KnowledgeGraph, MemoryGraph, PrefixMap, RdfSyntax, Role};
use dedalo_search::{
    AnyPruner, Blacklist, Heuristic, LabelOptions, LabelSet, NoopProfiler, Outcome, PrunerConfig,
    ScoredExplanation, Search, SearchConfig, SearchError, StopReason,
};
use tempfile::tempdir;

const PEOPLE_TTL: &str = r#"
@prefix ex: <http://example.org/> .

ex:A ex:likes ex:X ; ex:type ex:Person ; ex:age "30" .
ex:B ex:likes ex:X ; ex:type ex:Person .
ex:C ex:likes ex:X ; ex:type ex:Person .
ex:D ex:likes ex:Y ; ex:type ex:Person .
ex:E ex:likes ex:Y ; ex:type ex:Person .
ex:X ex:locatedIn ex:Paris .
ex:Y ex:locatedIn ex:Rome .
ex:Paris ex:capitalOf ex:France .
ex:Rome ex:capitalOf ex:Italy .
"#;

const LABELS: &str = "\
fans,<http://example.org/A>
fans,http://example.org/B
fans,http://example.org/C
others,http://example.org/D
others,http://example.org/E
others,http://example.org/Nobody
";

fn people() -> MemoryGraph {
    load_rdf_str(PEOPLE_TTL, RdfSyntax::Turtle).expect("turtle parses")
}

fn prefixes() -> PrefixMap {
    let mut map = PrefixMap::new();
    map.insert("ex", "http://example.org/");
    map
}

fn load_labels(g: &MemoryGraph, dir: &Path) -> LabelSet {
    let path = dir.join("labels.csv");
    fs::write(&path, LABELS).unwrap();
    LabelSet::from_csv(&path, g, &LabelOptions::default()).expect("labels load")
}

fn collect(
    g: &MemoryGraph,
    labels: &LabelSet,
    blacklist: &Blacklist,
    config: SearchConfig,
) -> (Vec<(String, String, f64)>, Option<Outcome>) {
    let mut search = Search::new(
        g,
        labels,
        blacklist,
        Box::new(AnyPruner::default()),
        Box::new(NoopProfiler),
        config,
    )
    .unwrap();
    let prefixes = prefixes();
    let found: Vec<ScoredExplanation> = search.by_ref().collect();
    let rows = found
        .iter()
        .map(|e| {
            let path = search.paths().describe(e.explanation.path, g, &prefixes);
            let endpoint = g
                .term(e.explanation.endpoint.raw(), Role::Object)
                .map(|t| prefixes.shorten(t))
                .unwrap_or_default();
            (path, endpoint, e.record.score)
        })
        .collect();
    (rows, search.outcome())
}

fn spill_config(dir: &Path) -> SearchConfig {
    SearchConfig {
        spill_parent: dir.to_path_buf(),
        ..SearchConfig::default()
    }
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_turtle_and_ntriples_load_the_same_graph() {
    let dir = tempdir().unwrap();
    let nt = dir.path().join("small.nt");
    fs::write(
        &nt,
        "<http://example.org/A> <http://example.org/likes> <http://example.org/X> .\n\
         <http://example.org/A> <http://example.org/age> \"30\" .\n",
    )
    .unwrap();
    let from_file = load_rdf_file(&nt).unwrap();
    assert_eq!(from_file.triple_count(), 2);

    let g = people();
    for (s, p, o) in [("A", "likes", "X"), ("X", "locatedIn", "Paris")] {
        let s = g.subject(&format!("http://example.org/{s}")).unwrap();
        let p = g.predicate(&format!("http://example.org/{p}")).unwrap();
        let o = g.object(&format!("http://example.org/{o}")).unwrap();
        assert_eq!(g.triples(s, Some(p), Some(o)).len(), 1);
    }
    // Literals are object-only.
    let age = g.predicate("http://example.org/age").unwrap();
    let a = g.subject("http://example.org/A").unwrap();
    let literal = g.triples(a, Some(age), None);
    assert_eq!(literal.len(), 1);
    let term = g.term(literal[0].object.raw(), Role::Object).unwrap();
    assert!(term.starts_with("\"30\""));
    assert!(g.object_to_subject(literal[0].object).is_none());
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");
    fs::write(&path, "{}").unwrap();
    assert!(load_rdf_file(&path).is_err());
}

#[test]
fn test_labels_missing_from_graph_are_skipped() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());
    assert_eq!(labels.positives().len(), 3);
    assert_eq!(labels.negatives().len(), 2);
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn test_two_hop_explanation_is_found() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());
    let (rows, outcome) = collect(&g, &labels, &Blacklist::new(), spill_config(dir.path()));

    let score_of = |path: &str, endpoint: &str| {
        rows.iter()
            .find(|(p, e, _)| p == path && e == endpoint)
            .map(|(_, _, s)| *s)
    };
    assert_relative_eq!(score_of("ex:likes", "ex:X").unwrap(), 1.0);
    assert_relative_eq!(score_of("ex:likes -> ex:locatedIn", "ex:Paris").unwrap(), 1.0);
    assert_relative_eq!(
        score_of("ex:likes -> ex:locatedIn -> ex:capitalOf", "ex:France").unwrap(),
        1.0
    );
    // 3 of 5 people are fans; everyone is a Person.
    assert_relative_eq!(score_of("ex:type", "ex:Person").unwrap(), 0.75);
    assert_eq!(outcome, Some(Outcome::Done(StopReason::FrontierExhausted)));
}

#[test]
fn test_blacklist_file_expands_prefixes() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());
    let list = dir.path().join("blacklist.txt");
    fs::write(&list, "# hide the direct hop\nex:likes\n\n<http://example.org/type>\n").unwrap();
    let blacklist = Blacklist::from_file(&list, &prefixes()).unwrap();
    assert_eq!(blacklist.len(), 2);

    let (rows, _) = collect(&g, &labels, &blacklist, spill_config(dir.path()));
    assert!(!rows.is_empty());
    assert!(rows
        .iter()
        .all(|(p, _, _)| !p.contains("ex:likes") && !p.contains("ex:type")));
}

#[test]
fn test_search_is_deterministic_across_heuristics_and_cache_sizes() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());

    let (first, _) = collect(&g, &labels, &Blacklist::new(), spill_config(dir.path()));
    let (second, _) = collect(
        &g,
        &labels,
        &Blacklist::new(),
        SearchConfig {
            cache_capacity: Some(2),
            ..spill_config(dir.path())
        },
    );
    assert_eq!(first, second);

    for heuristic in [Heuristic::LongestPathFirst, Heuristic::Entropy] {
        let (rows, outcome) = collect(
            &g,
            &labels,
            &Blacklist::new(),
            SearchConfig {
                heuristic,
                ..spill_config(dir.path())
            },
        );
        let mut a = first.clone();
        let mut b = rows;
        a.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(a, b, "{heuristic} explores the same space");
        assert_eq!(outcome, Some(Outcome::Done(StopReason::FrontierExhausted)));
    }
}

#[test]
fn test_minimum_score_filters_output() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());
    let (rows, _) = collect(
        &g,
        &labels,
        &Blacklist::new(),
        SearchConfig {
            minimum_score: 0.8,
            ..spill_config(dir.path())
        },
    );
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|(_, _, s)| *s > 0.8));
}

#[test]
fn test_cancelled_search_yields_nothing() {
    let g = people();
    let dir = tempdir().unwrap();
    let labels = load_labels(&g, dir.path());
    let blacklist = Blacklist::new();
    let mut search = Search::new(
        &g,
        &labels,
        &blacklist,
        Box::new(AnyPruner::from_configs(&PrunerConfig::for_level(1, true))),
        Box::new(NoopProfiler),
        spill_config(dir.path()),
    )
    .unwrap();
    search
        .cancel_handle()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    assert_eq!(search.by_ref().count(), 0);
    assert_eq!(search.outcome(), Some(Outcome::Done(StopReason::Cancelled)));
}

#[test]
fn test_configuration_errors_surface_before_search() {
    let g = people();
    let dir = tempdir().unwrap();

    let path = dir.path().join("negatives.csv");
    fs::write(&path, "x,http://example.org/A\n").unwrap();
    let options = LabelOptions {
        group_id: Some("fans".to_string()),
        ..LabelOptions::default()
    };
    let err = LabelSet::from_csv(&path, &g, &options).unwrap_err();
    assert!(matches!(err, SearchError::NoPositiveLabels));
    assert!(err.is_configuration());

    let missing = Blacklist::from_file(&dir.path().join("nope.txt"), &prefixes()).unwrap_err();
    assert!(matches!(missing, SearchError::MissingFile { .. }));

    assert!(matches!(
        "dfs".parse::<Heuristic>(),
        Err(SearchError::UnknownHeuristic(_))
    ));
}
