//! Skill loading errors

use std::path::PathBuf;

/// Errors raised while loading skill manifests and script catalogs.
///
/// Execution never surfaces these: capability calls report failures through
/// [`SkillResult`](super::result::SkillResult) instead.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Invalid script id '{0}': only letters, digits, '_' and '-' are allowed")]
    InvalidScriptId(String),

    #[error("Unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("Path '{0}' resolves outside its base directory")]
    PathEscapesBase(String),

    #[error("Unsupported interpreter: {0}")]
    UnsupportedInterpreter(String),

    #[error("Script file is not a regular file: {0}")]
    NotAFile(String),

    #[error("Script catalog has no 'scripts' list")]
    MissingScriptsList,

    #[error("Invalid intent response: {0}")]
    InvalidIntentResponse(String),
}

impl SkillError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type SkillLoadResult<T> = std::result::Result<T, SkillError>;
