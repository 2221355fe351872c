//! Plugin host. Plugins see the shared document state and talk to the
//! editor only through queued requests, never through each other.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::codec::{Snapshot, encode};
use super::content::{self, BlockType, CaretMove};
use super::node::{NodeKind, TextFormat};
use super::shortcuts::{ShortcutTable, ShortcutTransformer};
use super::state::{DocumentState, Selection};
use super::transaction::{ChangeKind, Transaction, Violation};
use super::{Commit, DispatchOutcome, Editor, Request};
use crate::config::EditorConfig;
use crate::error::EditorError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub subscribes_to_state: bool,
    pub issues_commands: bool,
    pub renders_chrome: bool,
}

/// Failure reported by a plugin hook.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct PluginFault {
    message: String,
}

impl PluginFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a plugin hook may touch: the current state and a request queue the
/// host drains after the hook returns.
pub struct PluginContext<'a> {
    state: &'a Arc<DocumentState>,
    editable: bool,
    requests: Vec<Request>,
}

impl<'a> PluginContext<'a> {
    fn new(state: &'a Arc<DocumentState>, editable: bool) -> Self {
        Self {
            state,
            editable,
            requests: Vec::new(),
        }
    }

    pub fn state(&self) -> &DocumentState {
        self.state
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn dispatch<F>(&mut self, builder: F)
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<(), Violation> + 'static,
    {
        self.requests.push(Request::Transaction(Box::new(builder)));
    }

    pub fn undo(&mut self) {
        self.requests.push(Request::Undo);
    }

    pub fn redo(&mut self) {
        self.requests.push(Request::Redo);
    }

    pub fn focus(&mut self) {
        self.requests.push(Request::Focus);
    }

    fn into_requests(self) -> Vec<Request> {
        self.requests
    }
}

pub trait Plugin {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Node kinds this plugin creates; checked once when the host starts.
    fn required_kinds(&self) -> Vec<NodeKind> {
        Vec::new()
    }

    fn commands(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn mount(&mut self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        Ok(())
    }

    fn on_commit(&mut self, _commit: &Commit, _ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        Ok(())
    }

    fn execute(&mut self, command: &str, _ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        Err(PluginFault::new(format!("{} does not handle {command}", self.name())))
    }

    fn chrome(&self, _editor: &Editor) -> Option<String> {
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin panicked".to_string()
    }
}

/// Runs plugin hooks so that an error or panic in one plugin is logged and
/// counted instead of unwinding through the editor.
#[derive(Debug, Default)]
pub struct ErrorContainment {
    faults: HashMap<&'static str, usize>,
}

impl ErrorContainment {
    pub fn run<T>(
        &mut self,
        plugin: &mut dyn Plugin,
        phase: &'static str,
        call: impl FnOnce(&mut dyn Plugin) -> Result<T, PluginFault>,
    ) -> Result<T, EditorError> {
        let name = plugin.name();
        let message = match panic::catch_unwind(AssertUnwindSafe(|| call(plugin))) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(fault)) => fault.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        *self.faults.entry(name).or_default() += 1;
        warn!(plugin = name, phase, error = %message, "plugin fault contained");
        Err(EditorError::PluginFault {
            plugin: name.to_string(),
            message,
        })
    }

    pub fn fault_count(&self, plugin: &str) -> usize {
        self.faults.get(plugin).copied().unwrap_or(0)
    }
}

struct PluginSlot {
    plugin: Box<dyn Plugin>,
    capabilities: Capabilities,
    commands: Vec<&'static str>,
}

struct PluginSet {
    slots: Vec<PluginSlot>,
    containment: ErrorContainment,
}

/// Owns the editor and the plugins composed around it.
pub struct PluginHost {
    editor: Editor,
    plugins: Rc<RefCell<PluginSet>>,
    mounted: bool,
}

impl PluginHost {
    pub fn new(mut editor: Editor, plugins: Vec<Box<dyn Plugin>>) -> Result<Self, EditorError> {
        let mut slots: Vec<PluginSlot> = Vec::with_capacity(plugins.len());
        let mut command_owners: HashMap<&'static str, &'static str> = HashMap::new();
        for plugin in plugins {
            let name = plugin.name();
            if slots.iter().any(|slot| slot.plugin.name() == name) {
                return Err(EditorError::Config(format!("plugin {name} registered twice")));
            }
            if let Some(kind) = plugin
                .required_kinds()
                .into_iter()
                .find(|kind| !editor.kinds().contains(*kind))
            {
                return Err(EditorError::UnregisteredKind(kind));
            }
            let commands = plugin.commands();
            for &command in &commands {
                if let Some(owner) = command_owners.insert(command, name) {
                    return Err(EditorError::Config(format!(
                        "command {command} is provided by both {owner} and {name}"
                    )));
                }
            }
            slots.push(PluginSlot {
                capabilities: plugin.capabilities(),
                commands,
                plugin,
            });
        }
        info!(
            plugins = slots.len(),
            commands = command_owners.len(),
            "plugin host ready"
        );

        let plugins = Rc::new(RefCell::new(PluginSet {
            slots,
            containment: ErrorContainment::default(),
        }));
        let shared = Rc::clone(&plugins);
        editor.subscribe(move |commit, followups| {
            let Ok(mut set) = shared.try_borrow_mut() else {
                warn!(revision = commit.revision, "plugins busy; commit not delivered");
                return;
            };
            let PluginSet { slots, containment } = &mut *set;
            for slot in slots
                .iter_mut()
                .filter(|slot| slot.capabilities.subscribes_to_state)
            {
                let mut ctx = PluginContext::new(&commit.state, commit.editable);
                let delivered = containment.run(slot.plugin.as_mut(), "on_commit", |plugin| {
                    plugin.on_commit(commit, &mut ctx)
                });
                if delivered.is_ok() {
                    followups.extend(ctx.into_requests());
                }
            }
        });

        Ok(Self {
            editor,
            plugins,
            mounted: false,
        })
    }

    /// Editor plus the standard plugin set. `on_change` only hears about
    /// content changes, not caret movement.
    pub fn with_defaults<F>(
        config: &EditorConfig,
        snapshot: Option<&Snapshot>,
        on_change: F,
    ) -> Result<Self, EditorError>
    where
        F: FnMut(&Snapshot) + 'static,
    {
        let editor = Editor::new(config, snapshot)?;
        let plugins: Vec<Box<dyn Plugin>> = vec![
            Box::new(AutoFocus::default()),
            Box::new(HistoryPlugin),
            Box::new(MarkdownShortcuts::new(config.shortcuts.clone())),
            Box::new(HorizontalRuleCommand),
            Box::new(ChangeNotifier::new(on_change).ignore_selection_change(true)),
        ];
        Self::new(editor, plugins)
    }

    /// Run every plugin's mount hook once. Faults are contained and logged.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        let count = self.plugins.borrow().slots.len();
        for index in 0..count {
            if let Err(err) = self.run_plugin(index, "mount", |plugin, ctx| plugin.mount(ctx)) {
                debug!(error = %err, "mount hook failed");
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Run one hook, then apply what it queued. Returns the violations of
    /// requests the editor rejected.
    fn run_plugin(
        &mut self,
        index: usize,
        phase: &'static str,
        call: impl FnOnce(&mut dyn Plugin, &mut PluginContext<'_>) -> Result<(), PluginFault>,
    ) -> Result<Vec<Violation>, EditorError> {
        let state = self.editor.state();
        let editable = self.editor.is_editable();
        let requests = {
            let mut set = self.plugins.borrow_mut();
            let PluginSet { slots, containment } = &mut *set;
            let Some(slot) = slots.get_mut(index) else {
                return Ok(Vec::new());
            };
            let mut ctx = PluginContext::new(&state, editable);
            containment.run(slot.plugin.as_mut(), phase, |plugin| call(plugin, &mut ctx))?;
            ctx.into_requests()
        };
        let mut rejected = Vec::new();
        for request in requests {
            if let DispatchOutcome::Rejected(violation) = self.editor.apply(request)? {
                debug!(%violation, phase, "plugin request rejected");
                rejected.push(violation);
            }
        }
        Ok(rejected)
    }

    /// Run a named plugin command. A command whose change the editor
    /// refuses fails with [`EditorError::StructuralViolation`].
    pub fn execute(&mut self, command: &str) -> Result<(), EditorError> {
        let index = self
            .plugins
            .borrow()
            .slots
            .iter()
            .position(|slot| slot.commands.iter().any(|name| *name == command))
            .ok_or_else(|| EditorError::UnknownCommand(command.to_string()))?;
        debug!(command, "executing plugin command");
        let rejected = self.run_plugin(index, "execute", |plugin, ctx| plugin.execute(command, ctx))?;
        match rejected.into_iter().next() {
            Some(violation) => Err(violation.into()),
            None => Ok(()),
        }
    }

    pub fn focus(&mut self) {
        self.editor.focus();
    }

    pub fn undo(&mut self) -> Result<(), EditorError> {
        self.execute(HistoryPlugin::UNDO)
    }

    pub fn redo(&mut self) -> Result<(), EditorError> {
        self.execute(HistoryPlugin::REDO)
    }

    pub fn insert_horizontal_rule(&mut self) -> Result<(), EditorError> {
        self.execute(HorizontalRuleCommand::COMMAND)
    }

    pub fn insert_text(&mut self, text: &str) -> Result<DispatchOutcome, EditorError> {
        self.editor.insert_text(text)
    }

    pub fn delete_backward(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.editor.delete_backward()
    }

    pub fn delete_forward(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.editor.delete_forward()
    }

    pub fn insert_paragraph_break(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.editor.insert_paragraph_break()
    }

    pub fn set_block_type(&mut self, target: BlockType) -> Result<DispatchOutcome, EditorError> {
        self.editor.set_block_type(target)
    }

    pub fn toggle_format(&mut self, format: TextFormat) -> Result<DispatchOutcome, EditorError> {
        self.editor.toggle_format(format)
    }

    pub fn move_caret(
        &mut self,
        movement: CaretMove,
        extend: bool,
    ) -> Result<DispatchOutcome, EditorError> {
        self.editor.move_caret(movement, extend)
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<DispatchOutcome, EditorError> {
        self.editor.set_selection(selection)
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    /// Direct access for the editing surface's text and caret commands.
    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    pub fn state(&self) -> Arc<DocumentState> {
        self.editor.state()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.editor.snapshot()
    }

    pub fn chrome(&self) -> Vec<String> {
        let set = self.plugins.borrow();
        set.slots
            .iter()
            .filter(|slot| slot.capabilities.renders_chrome)
            .filter_map(|slot| slot.plugin.chrome(&self.editor))
            .collect()
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.plugin.name())
            .collect()
    }

    pub fn fault_count(&self, plugin: &str) -> usize {
        self.plugins.borrow().containment.fault_count(plugin)
    }
}

/// Requests focus once, the first time it is mounted.
#[derive(Debug, Default)]
pub struct AutoFocus {
    fired: bool,
}

impl Plugin for AutoFocus {
    fn name(&self) -> &'static str {
        "autofocus"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            issues_commands: true,
            ..Capabilities::default()
        }
    }

    fn mount(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        if self.fired {
            return Ok(());
        }
        self.fired = true;
        ctx.focus();
        let start = ctx.state().first_caret();
        if ctx.state().caret() != Some(start) {
            ctx.dispatch(move |tx| tx.set_selection(Selection::caret(start)));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HistoryPlugin;

impl HistoryPlugin {
    pub const UNDO: &'static str = "undo";
    pub const REDO: &'static str = "redo";
}

impl Plugin for HistoryPlugin {
    fn name(&self) -> &'static str {
        "history"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            issues_commands: true,
            renders_chrome: true,
            ..Capabilities::default()
        }
    }

    fn commands(&self) -> Vec<&'static str> {
        vec![Self::UNDO, Self::REDO]
    }

    fn execute(&mut self, command: &str, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        match command {
            Self::UNDO => ctx.undo(),
            Self::REDO => ctx.redo(),
            other => return Err(PluginFault::new(format!("history does not handle {other}"))),
        }
        Ok(())
    }

    fn chrome(&self, editor: &Editor) -> Option<String> {
        let history = editor.history();
        Some(format!(
            "undo {} | redo {}",
            history.undo_depth(),
            history.redo_depth()
        ))
    }
}

/// Expands markdown-style markers after the user types them.
#[derive(Debug, Default)]
pub struct MarkdownShortcuts {
    transformer: ShortcutTransformer,
}

impl MarkdownShortcuts {
    pub fn new(table: ShortcutTable) -> Self {
        Self {
            transformer: ShortcutTransformer::new(table),
        }
    }
}

impl Plugin for MarkdownShortcuts {
    fn name(&self) -> &'static str {
        "markdown-shortcuts"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            subscribes_to_state: true,
            issues_commands: true,
            ..Capabilities::default()
        }
    }

    fn required_kinds(&self) -> Vec<NodeKind> {
        self.transformer.table().produced_kinds()
    }

    fn on_commit(&mut self, commit: &Commit, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        if let Some(found) = self.transformer.evaluate(commit) {
            ctx.dispatch(move |tx| found.apply(tx));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HorizontalRuleCommand;

impl HorizontalRuleCommand {
    pub const COMMAND: &'static str = "insert-horizontal-rule";
}

impl Plugin for HorizontalRuleCommand {
    fn name(&self) -> &'static str {
        "horizontal-rule"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            issues_commands: true,
            ..Capabilities::default()
        }
    }

    fn required_kinds(&self) -> Vec<NodeKind> {
        vec![NodeKind::HorizontalRule]
    }

    fn commands(&self) -> Vec<&'static str> {
        vec![Self::COMMAND]
    }

    fn execute(&mut self, command: &str, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        if command != Self::COMMAND {
            return Err(PluginFault::new(format!("horizontal-rule does not handle {command}")));
        }
        ctx.dispatch(content::insert_horizontal_rule);
        Ok(())
    }
}

/// Hands an encoded snapshot to an outside callback after each commit.
pub struct ChangeNotifier {
    on_change: Box<dyn FnMut(&Snapshot)>,
    ignore_selection_change: bool,
}

impl ChangeNotifier {
    pub fn new<F>(on_change: F) -> Self
    where
        F: FnMut(&Snapshot) + 'static,
    {
        Self {
            on_change: Box::new(on_change),
            ignore_selection_change: false,
        }
    }

    pub fn ignore_selection_change(mut self, ignore: bool) -> Self {
        self.ignore_selection_change = ignore;
        self
    }
}

impl Plugin for ChangeNotifier {
    fn name(&self) -> &'static str {
        "change-notifier"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            subscribes_to_state: true,
            ..Capabilities::default()
        }
    }

    fn on_commit(&mut self, commit: &Commit, _ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        if self.ignore_selection_change && commit.change == ChangeKind::Selection {
            return Ok(());
        }
        (self.on_change)(&encode(&commit.state));
        Ok(())
    }
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod plugins_tests;
