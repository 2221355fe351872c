//! Structured rich-text editing core for recipe steps.
//!
//! A document is an immutable tree of nodes. Every change goes through a
//! validated [`Transaction`](editor::Transaction) committed by the
//! [`Editor`](editor::Editor), which records undo history and notifies
//! listeners. Plugins compose extra behaviour around one editor through the
//! [`PluginHost`](editor::PluginHost). Documents persist as Lexical-style
//! JSON snapshots.

pub mod config;
pub mod editor;
pub mod error;
pub mod export;

pub use config::{EditorConfig, HistoryConfig};
pub use editor::{DispatchOutcome, DocumentState, Editor, PluginHost, Snapshot};
pub use error::EditorError;
