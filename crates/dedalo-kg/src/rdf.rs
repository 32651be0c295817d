//! RDF loading into [`MemoryGraph`].
//!
//! Parsing is delegated to Sophia. Terms are normalized before they enter
//! the dictionaries:
//!
//! - IRIs lose their angle brackets (`<http://x>` → `http://x`)
//! - blank nodes keep their `_:label` form
//! - literals keep their N-Triples display form (`"42"^^<…#int>`), minus an
//!   explicit `xsd:string` datatype, and only ever occur as objects
//!
//! Triples whose predicate is not an IRI are skipped.

use sophia::api::prelude::*;
use std::fs;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tracing::info;

use crate::{GraphBuilder, GraphError, KnowledgeGraph, MemoryGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfSyntax {
    NTriples,
    Turtle,
}

impl RdfSyntax {
    /// Guess the syntax from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "nt" | "ntriples" => Some(RdfSyntax::NTriples),
            "ttl" | "turtle" => Some(RdfSyntax::Turtle),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct RdfSinkError {
    message: String,
}

fn node_term(display: &str) -> Option<String> {
    let s = display.trim();
    if let Some(iri) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Some(iri.to_string());
    }
    if s.starts_with("_:") {
        return Some(s.to_string());
    }
    None
}

const XSD_STRING_SUFFIX: &str = "^^<http://www.w3.org/2001/XMLSchema#string>";

fn object_term(display: &str) -> String {
    if let Some(node) = node_term(display) {
        return node;
    }
    let s = display.trim();
    s.strip_suffix(XSD_STRING_SUFFIX).unwrap_or(s).to_string()
}

fn sink(
    builder: &mut GraphBuilder,
    s: String,
    p: String,
    o: String,
) -> std::result::Result<(), RdfSinkError> {
    let Some(subject) = node_term(&s) else {
        return Err(RdfSinkError {
            message: format!("literal in subject position: {s}"),
        });
    };
    let Some(predicate) = node_term(&p).filter(|p| !p.starts_with("_:")) else {
        return Ok(());
    };
    builder.insert(&subject, &predicate, &object_term(&o));
    Ok(())
}

/// Parse RDF text into a graph.
pub fn load_rdf_str(text: &str, syntax: RdfSyntax) -> Result<MemoryGraph, GraphError> {
    load_rdf_bytes(text.as_bytes(), syntax, "<inline>")
}

/// Load an N-Triples or Turtle file, choosing the parser by extension.
pub fn load_rdf_file(path: &Path) -> Result<MemoryGraph, GraphError> {
    let Some(syntax) = RdfSyntax::from_path(path) else {
        return Err(GraphError::UnsupportedSyntax {
            path: path.to_path_buf(),
        });
    };
    let bytes = fs::read(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), ?syntax, "loading knowledge graph");
    let graph = load_rdf_bytes(&bytes, syntax, &path.display().to_string())?;
    info!(
        triples = graph.triple_count(),
        subjects = graph.subject_count(),
        predicates = graph.predicate_count(),
        objects = graph.object_count(),
        "loaded knowledge graph"
    );
    Ok(graph)
}

fn load_rdf_bytes(bytes: &[u8], syntax: RdfSyntax, origin: &str) -> Result<MemoryGraph, GraphError> {
    let reader = BufReader::new(Cursor::new(bytes));
    let mut builder = GraphBuilder::new();

    let parsed = match syntax {
        RdfSyntax::NTriples => {
            let mut parser = sophia::turtle::parser::nt::parse_bufread(reader);
            parser
                .try_for_each_triple(|t| {
                    sink(
                        &mut builder,
                        t.s().to_string(),
                        t.p().to_string(),
                        t.o().to_string(),
                    )
                })
                .map_err(|e| e.to_string())
        }
        RdfSyntax::Turtle => {
            let mut parser = sophia::turtle::parser::turtle::parse_bufread(reader);
            parser
                .try_for_each_triple(|t| {
                    sink(
                        &mut builder,
                        t.s().to_string(),
                        t.p().to_string(),
                        t.o().to_string(),
                    )
                })
                .map_err(|e| e.to_string())
        }
    };

    parsed.map_err(|message| GraphError::Parse {
        origin: origin.to_string(),
        message,
    })?;
    Ok(builder.build())
}
