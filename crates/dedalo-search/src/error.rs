use std::path::PathBuf;

use dedalo_kg::GraphError;

/// Errors raised by the search engine.
///
/// Everything except `Spill`, `Encode` and `EndpointNotReached` is a
/// configuration error and surfaces before the first round.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{} does not exist", .path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: expected `group<delim>uri[<delim>...]`", .path.display())]
    MalformedLabelRow { path: PathBuf, line: usize },

    #[error("cannot run without positive examples")]
    NoPositiveLabels,

    #[error("unknown heuristic `{0}` (expected one of: shortest-path-first, longest-path-first, entropy)")]
    UnknownHeuristic(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("reachability spill failed for {}: {source}", .path.display())]
    Spill {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reachability spill encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("endpoint {endpoint} was never reached via path `{path}`")]
    EndpointNotReached { path: String, endpoint: u32 },
}

impl SearchError {
    /// True for errors that can only occur before the search starts.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            SearchError::Spill { .. } | SearchError::Encode(_) | SearchError::EndpointNotReached { .. }
        )
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
