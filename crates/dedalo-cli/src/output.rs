//! Explanation rows, as written to the output file.

use std::io::{self, Write};

use clap::ValueEnum;
use dedalo_kg::{KnowledgeGraph, PrefixMap, Role};
use dedalo_search::ScoredExplanation;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated: score, path, endpoint, counts.
    #[default]
    Text,
    /// One JSON object per line.
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub score: f64,
    pub path: Vec<String>,
    pub endpoint: String,
    pub num_connected_positives: u64,
    pub num_connected_negatives: u64,
    pub num_positives: usize,
    pub num_examples: usize,
}

impl OutputRow {
    pub fn new(found: &ScoredExplanation, graph: &dyn KnowledgeGraph, prefixes: &PrefixMap) -> Self {
        let path = found
            .predicates
            .iter()
            .map(|p| term_or_id(graph, p.raw(), Role::Predicate, prefixes))
            .collect();
        let endpoint = term_or_id(
            graph,
            found.explanation.endpoint.raw(),
            Role::Object,
            prefixes,
        );
        let record = &found.record;
        Self {
            score: record.score,
            path,
            endpoint,
            num_connected_positives: record.num_connected_positives,
            num_connected_negatives: record.num_connected_negatives,
            num_positives: record.num_positives,
            num_examples: record.num_examples,
        }
    }

    pub fn write_to(&self, out: &mut impl Write, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Text => writeln!(
                out,
                "{:.6}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.score,
                self.path.join(" -> "),
                self.endpoint,
                self.num_connected_positives,
                self.num_connected_negatives,
                self.num_positives,
                self.num_examples,
            ),
            OutputFormat::Jsonl => {
                serde_json::to_writer(&mut *out, self)?;
                out.write_all(b"\n")
            }
        }
    }
}

fn term_or_id(graph: &dyn KnowledgeGraph, id: u32, role: Role, prefixes: &PrefixMap) -> String {
    match graph.term(id, role) {
        Some(term) => prefixes.shorten(term),
        None => format!("#{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedalo_kg::MemoryGraph;
    use dedalo_search::{Explanation, PathId, Record};

    fn row() -> (MemoryGraph, ScoredExplanation) {
        let g = MemoryGraph::from_triples([("http://ex.org/a", "http://ex.org/likes", "http://ex.org/x")]);
        let likes = g.predicate("http://ex.org/likes").unwrap();
        let x = g.object("http://ex.org/x").unwrap();
        let record = Record {
            score: 0.75,
            num_examples: 5,
            num_positives: 3,
            num_connected_positives: 3,
            num_connected_negatives: 2,
        };
        let found = ScoredExplanation {
            explanation: Explanation::new(PathId::EMPTY, x),
            predicates: vec![likes],
            record,
        };
        (g, found)
    }

    #[test]
    fn text_row_uses_shortened_terms() {
        let (g, found) = row();
        let mut prefixes = PrefixMap::new();
        prefixes.insert("ex", "http://ex.org/");

        let mut buf = Vec::new();
        OutputRow::new(&found, &g, &prefixes)
            .write_to(&mut buf, OutputFormat::Text)
            .unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "0.750000\tex:likes\tex:x\t3\t2\t3\t5\n"
        );
    }

    #[test]
    fn jsonl_row_is_one_object_per_line() {
        let (g, found) = row();
        let mut buf = Vec::new();
        OutputRow::new(&found, &g, &PrefixMap::new())
            .write_to(&mut buf, OutputFormat::Jsonl)
            .unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["endpoint"], "http://ex.org/x");
        assert_eq!(value["path"][0], "http://ex.org/likes");
        assert_eq!(value["num_connected_negatives"], 2);
    }
}
