use std::path::PathBuf;

use thiserror::Error;

/// Fatal outcome of replaying a delta log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MaterializationError {
    #[error("delta log has no initial state record")]
    NoInitialState,
}

/// Why a single log line could not be turned into a mutation record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record has no kind")]
    MissingKind,

    #[error("unknown record kind: {0}")]
    UnknownKind(i64),

    #[error("invalid key path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Error)]
pub enum ChatlogError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid id: {0}")]
    InvalidSessionId(String),

    #[error("cannot determine config directory")]
    ConfigDirectoryNotFound,

    #[error("workspace not found: {workspace_id}")]
    WorkspaceNotFound {
        workspace_id: String,
        searched_roots: Vec<PathBuf>,
    },

    #[error("session not found for workspace_id={workspace_id} session_id={session_id}")]
    SessionNotFound {
        workspace_id: String,
        session_id: String,
        searched_roots: Vec<PathBuf>,
    },

    #[error("unsupported session file: {path}")]
    UnsupportedSessionFile { path: PathBuf },

    #[error("session file is empty: {path}")]
    EmptySessionFile { path: PathBuf },

    #[error("session file is not valid UTF-8: {path}")]
    NonUtf8SessionFile { path: PathBuf },

    #[error("cannot materialize {path}: {source}")]
    Materialization {
        path: PathBuf,
        #[source]
        source: MaterializationError,
    },

    #[error("invalid json in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChatlogError>;
