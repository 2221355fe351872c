//! Error types for the editor core.
use thiserror::Error;

use crate::editor::{NodeKind, Violation};

#[derive(Error, Debug)]
pub enum EditorError {
    /// A plugin command whose change was refused. Direct dispatch reports
    /// refusals as `DispatchOutcome::Rejected` instead.
    #[error("structural violation: {0}")]
    StructuralViolation(#[from] Violation),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("editor is read-only")]
    ReadOnly,

    #[error("plugin {plugin} failed: {message}")]
    PluginFault { plugin: String, message: String },

    #[error("node kind {0} is not registered")]
    UnregisteredKind(NodeKind),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EditorError {
    pub fn is_read_only(&self) -> bool {
        matches!(self, EditorError::ReadOnly)
    }
}
