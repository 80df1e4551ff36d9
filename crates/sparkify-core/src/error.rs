use std::path::PathBuf;

use thiserror::Error;

use crate::statement::Phase;

/// Failure of a pipeline step, tagged with the statement that caused it.
///
/// The underlying driver error is kept unchanged as the source.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("{phase} statement `{statement}` failed")]
    Statement {
        phase: Phase,
        statement: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("commit after {phase} statement `{statement}` failed")]
    Commit {
        phase: Phase,
        statement: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EtlError {
    pub fn phase(&self) -> Phase {
        match self {
            EtlError::Statement { phase, .. } | EtlError::Commit { phase, .. } => *phase,
        }
    }

    pub fn statement(&self) -> &str {
        match self {
            EtlError::Statement { statement, .. } | EtlError::Commit { statement, .. } => {
                statement
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected `[section]` or `key = value`, got `{content}`")]
    Syntax { line: usize, content: String },

    #[error("line {line}: `{key}` appears before any [section]")]
    KeyOutsideSection { line: usize, key: String },

    #[error("missing [{0}] section")]
    MissingSection(String),

    #[error("missing {key} in [{section}]")]
    MissingKey { section: String, key: String },

    #[error("invalid {key} in [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
}
