//! Editor configuration: registered node kinds, shortcut table, editability
//! and history tuning.

use std::env;
use std::time::Duration;

use crate::editor::{KindSet, NodeKind, ShortcutTable};
use crate::error::EditorError;

const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_ENTRIES: usize = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Longest idle gap between two keystrokes that still merge into one
    /// undo step.
    pub coalesce_window: Duration,
    /// Oldest entries are dropped beyond this depth.
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EditorConfig {
    pub editable: bool,
    pub kinds: KindSet,
    pub shortcuts: ShortcutTable,
    pub history: HistoryConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            editable: true,
            kinds: KindSet::all(),
            shortcuts: ShortcutTable::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Parse a boolean-like environment flag value.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsy: `0`, `false`, `no`, `off`, empty.
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

impl EditorConfig {
    /// Defaults overlaid with `RICHSTEP_READ_ONLY`, `RICHSTEP_COALESCE_MS`
    /// and `RICHSTEP_HISTORY_LIMIT` when they are set and parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(read_only) = env::var("RICHSTEP_READ_ONLY")
            .ok()
            .and_then(|value| parse_env_flag(&value))
        {
            config.editable = !read_only;
        }
        if let Some(ms) = env_number::<u64>("RICHSTEP_COALESCE_MS") {
            config.history.coalesce_window = Duration::from_millis(ms);
        }
        if let Some(limit) = env_number::<usize>("RICHSTEP_HISTORY_LIMIT") {
            config.history.max_entries = limit;
        }
        config
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_kinds(mut self, kinds: KindSet) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_shortcuts(mut self, shortcuts: ShortcutTable) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Fails fast on a kind set the editor cannot work with, or on a
    /// shortcut that produces an unregistered kind.
    pub fn validate(&self) -> Result<(), EditorError> {
        for required in [NodeKind::Root, NodeKind::Paragraph, NodeKind::Text] {
            if !self.kinds.contains(required) {
                return Err(EditorError::UnregisteredKind(required));
            }
        }
        for kind in self.shortcuts.produced_kinds() {
            if !self.kinds.contains(kind) {
                return Err(EditorError::UnregisteredKind(kind));
            }
        }
        if self.history.max_entries == 0 {
            return Err(EditorError::Config(
                "history needs room for at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{Replacement, ShortcutRule, Trigger};

    #[test]
    fn parse_env_flag_accepts_truthy_values() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            assert_eq!(parse_env_flag(value), Some(true), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_accepts_falsy_values() {
        for value in ["", "0", "false", "FALSE", " no ", "off"] {
            assert_eq!(parse_env_flag(value), Some(false), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_rejects_unknown_values() {
        assert_eq!(parse_env_flag("maybe"), None);
        assert_eq!(parse_env_flag("enabled"), None);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EditorConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_paragraph_kind_fails_validation() {
        let kinds = KindSet::new([NodeKind::Root, NodeKind::Text]);
        let config = EditorConfig::default()
            .with_kinds(kinds)
            .with_shortcuts(ShortcutTable::empty());
        assert!(matches!(
            config.validate(),
            Err(EditorError::UnregisteredKind(NodeKind::Paragraph))
        ));
    }

    #[test]
    fn shortcut_to_unregistered_kind_fails_validation() {
        let kinds = KindSet::new([NodeKind::Root, NodeKind::Paragraph, NodeKind::Text]);
        let shortcuts = ShortcutTable::empty().with_rule(ShortcutRule::new(
            Trigger::Line("---".to_string()),
            Replacement::HorizontalRule,
        ));
        let config = EditorConfig::default()
            .with_kinds(kinds)
            .with_shortcuts(shortcuts);
        assert!(matches!(
            config.validate(),
            Err(EditorError::UnregisteredKind(NodeKind::HorizontalRule))
        ));
    }

    #[test]
    fn zero_history_depth_is_rejected() {
        let config = EditorConfig::default().with_history(HistoryConfig {
            coalesce_window: Duration::from_millis(10),
            max_entries: 0,
        });
        assert!(matches!(config.validate(), Err(EditorError::Config(_))));
    }
}
