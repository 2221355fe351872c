use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::editor::{CaretMove, KindSet, NodeData};

fn host_with(plugins: Vec<Box<dyn Plugin>>) -> PluginHost {
    let editor = Editor::new(&EditorConfig::default(), None).unwrap();
    PluginHost::new(editor, plugins).unwrap()
}

fn type_chars(host: &mut PluginHost, text: &str) {
    for ch in text.chars() {
        host.insert_text(&ch.to_string()).unwrap();
    }
}

fn recorder() -> (Rc<RefCell<Vec<Snapshot>>>, ChangeNotifier) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let notifier = ChangeNotifier::new(move |snapshot: &Snapshot| sink.borrow_mut().push(snapshot.clone()));
    (seen, notifier)
}

/// Fails in every hook, alternating between errors and panics.
struct Explosive;

impl Plugin for Explosive {
    fn name(&self) -> &'static str {
        "explosive"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            subscribes_to_state: true,
            issues_commands: true,
            renders_chrome: true,
        }
    }

    fn commands(&self) -> Vec<&'static str> {
        vec!["explode"]
    }

    fn mount(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        ctx.dispatch(|tx| tx.abort("never applied"));
        panic!("mount blew up");
    }

    fn on_commit(&mut self, _commit: &Commit, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        ctx.dispatch(|tx| {
            let root = tx.state().root();
            tx.append(root, NodeData::HorizontalRule).map(|_| ())
        });
        Err(PluginFault::new("commit handler failed"))
    }

    fn execute(&mut self, _command: &str, _ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
        panic!("command blew up");
    }
}

#[test]
fn duplicate_plugin_names_are_rejected() {
    let editor = Editor::new(&EditorConfig::default(), None).unwrap();
    let result = PluginHost::new(
        editor,
        vec![Box::new(AutoFocus::default()), Box::new(AutoFocus::default())],
    );
    assert!(matches!(result, Err(EditorError::Config(_))));
}

#[test]
fn duplicate_commands_are_rejected() {
    struct Impostor;
    impl Plugin for Impostor {
        fn name(&self) -> &'static str {
            "impostor"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        fn commands(&self) -> Vec<&'static str> {
            vec![HistoryPlugin::UNDO]
        }
    }
    let editor = Editor::new(&EditorConfig::default(), None).unwrap();
    let result = PluginHost::new(editor, vec![Box::new(HistoryPlugin), Box::new(Impostor)]);
    assert!(matches!(result, Err(EditorError::Config(_))));
}

#[test]
fn plugin_needing_unregistered_kind_is_rejected() {
    let config = EditorConfig::default()
        .with_kinds(KindSet::new([NodeKind::Root, NodeKind::Paragraph, NodeKind::Text]))
        .with_shortcuts(ShortcutTable::empty());
    let editor = Editor::new(&config, None).unwrap();
    let result = PluginHost::new(editor, vec![Box::new(HorizontalRuleCommand)]);
    assert!(matches!(
        result,
        Err(EditorError::UnregisteredKind(NodeKind::HorizontalRule))
    ));
}

#[test]
fn autofocus_fires_once_on_mount() {
    let mut host = host_with(vec![Box::new(AutoFocus::default())]);
    assert!(!host.editor().is_focused());
    host.mount();
    assert!(host.editor().is_focused());
    host.editor_mut().blur();
    host.mount();
    assert!(!host.editor().is_focused());
}

#[test]
fn autofocus_moves_caret_to_document_start() {
    let mut host = host_with(vec![Box::new(AutoFocus::default())]);
    type_chars(&mut host, "Knead");
    host.mount();
    let state = host.state();
    assert_eq!(state.caret(), Some(state.first_caret()));
    assert_eq!(state.outline(), "root[p[\"Knead\"]]");
}

#[test]
fn autofocus_works_while_read_only() {
    let editor = Editor::new(&EditorConfig::default().with_editable(false), None).unwrap();
    let mut host = PluginHost::new(editor, vec![Box::new(AutoFocus::default())]).unwrap();
    host.mount();
    assert!(host.editor().is_focused());
}

#[test]
fn unknown_command_is_reported() {
    let mut host = host_with(vec![Box::new(HistoryPlugin)]);
    assert!(matches!(
        host.execute("bold"),
        Err(EditorError::UnknownCommand(name)) if name == "bold"
    ));
}

#[test]
fn history_commands_undo_and_redo() {
    let mut host = host_with(vec![Box::new(HistoryPlugin)]);
    type_chars(&mut host, "cat");
    host.undo().unwrap();
    assert_eq!(host.state().outline(), "root[p]");
    host.redo().unwrap();
    assert_eq!(host.state().outline(), "root[p[\"cat\"]]");
}

#[test]
fn history_chrome_reports_depths() {
    let mut host = host_with(vec![Box::new(HistoryPlugin), Box::new(AutoFocus::default())]);
    assert_eq!(host.chrome(), vec!["undo 0 | redo 0".to_string()]);
    host.insert_text("a").unwrap();
    host.undo().unwrap();
    assert_eq!(host.chrome(), vec!["undo 0 | redo 1".to_string()]);
}

#[test]
fn dashes_expand_into_a_rule_through_the_host() {
    let mut host = host_with(vec![
        Box::new(HistoryPlugin),
        Box::new(MarkdownShortcuts::default()),
    ]);
    type_chars(&mut host, "---");
    let state = host.state();
    assert_eq!(state.outline(), "root[hr, p]");
    let after_rule = state.children(state.root())[1];
    assert_eq!(state.caret(), Some(state.block_start(after_rule)));

    host.undo().unwrap();
    assert_eq!(host.state().outline(), "root[p[\"---\"]]");
}

#[test]
fn wrapped_markers_format_through_the_host() {
    let mut host = host_with(vec![
        Box::new(HistoryPlugin),
        Box::new(MarkdownShortcuts::default()),
    ]);
    type_chars(&mut host, "Mix **well** now");
    assert_eq!(
        host.state().outline(),
        "root[p[\"Mix \", \"well\"/1, \" now\"]]"
    );
    host.undo().unwrap();
    assert_eq!(host.state().outline(), "root[p[\"Mix \", \"well\"/1]]");
    host.undo().unwrap();
    assert_eq!(host.state().outline(), "root[p[\"Mix **well**\"]]");
}

#[test]
fn shortcut_expansion_does_not_retrigger() {
    let mut host = host_with(vec![Box::new(MarkdownShortcuts::default())]);
    type_chars(&mut host, "- ");
    assert_eq!(host.state().outline(), "root[ul[li]]");
    type_chars(&mut host, "- ");
    assert_eq!(host.state().outline(), "root[ul[li[\"- \"]]]");
}

#[test]
fn rule_command_inserts_a_rule() {
    let mut host = host_with(vec![Box::new(HorizontalRuleCommand)]);
    type_chars(&mut host, "Knead");
    host.insert_horizontal_rule().unwrap();
    assert_eq!(host.state().outline(), "root[p[\"Knead\"], hr, p]");
}

#[test]
fn notifier_sees_every_commit() {
    let (seen, notifier) = recorder();
    let mut host = host_with(vec![Box::new(notifier)]);
    type_chars(&mut host, "ab");
    host.editor_mut().move_caret(CaretMove::Left, false).unwrap();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1], host.snapshot());
}

#[test]
fn notifier_can_skip_selection_changes() {
    let (seen, notifier) = recorder();
    let mut host = host_with(vec![Box::new(notifier.ignore_selection_change(true))]);
    type_chars(&mut host, "ab");
    host.editor_mut().move_caret(CaretMove::Left, false).unwrap();
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn faulty_plugin_is_contained() {
    let (seen, notifier) = recorder();
    let mut host = host_with(vec![
        Box::new(Explosive),
        Box::new(AutoFocus::default()),
        Box::new(notifier),
    ]);

    host.mount();
    assert!(host.editor().is_focused());
    assert_eq!(host.fault_count("explosive"), 1);

    host.insert_text("a").unwrap();
    assert_eq!(host.state().outline(), "root[p[\"a\"]]");
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(host.fault_count("explosive"), 2);

    let before = host.snapshot();
    let result = host.execute("explode");
    assert!(matches!(
        result,
        Err(EditorError::PluginFault { plugin, .. }) if plugin == "explosive"
    ));
    assert_eq!(host.snapshot(), before);
    assert_eq!(host.fault_count("explosive"), 3);

    host.insert_text("b").unwrap();
    assert_eq!(host.state().outline(), "root[p[\"ab\"]]");
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(host.fault_count("autofocus"), 0);
}

#[test]
fn refused_command_change_is_an_error() {
    struct LooseText;
    impl Plugin for LooseText {
        fn name(&self) -> &'static str {
            "loose-text"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                issues_commands: true,
                ..Capabilities::default()
            }
        }
        fn commands(&self) -> Vec<&'static str> {
            vec!["loose-text"]
        }
        fn execute(&mut self, _command: &str, ctx: &mut PluginContext<'_>) -> Result<(), PluginFault> {
            ctx.dispatch(|tx| {
                let root = tx.state().root();
                tx.append(root, NodeData::text("stray")).map(|_| ())
            });
            Ok(())
        }
    }

    let mut host = host_with(vec![Box::new(LooseText)]);
    let before = host.snapshot();
    assert!(matches!(
        host.execute("loose-text"),
        Err(EditorError::StructuralViolation(Violation::IllegalChild {
            parent: NodeKind::Root,
            child: NodeKind::Text
        }))
    ));
    assert_eq!(host.snapshot(), before);
    assert_eq!(host.fault_count("loose-text"), 0);
}

#[test]
fn read_only_host_still_moves_the_caret() {
    let snapshot = Snapshot::from_json(
        r#"{"root": {"type": "root", "children": [
            {"type": "paragraph", "children": [{"type": "text", "text": "Knead"}]}
        ]}}"#,
    )
    .unwrap();
    let config = EditorConfig::default().with_editable(false);
    let editor = Editor::new(&config, Some(&snapshot)).unwrap();
    let (seen, notifier) = recorder();
    let mut host = PluginHost::new(editor, vec![Box::new(notifier)]).unwrap();
    host.editor_mut().select_all().unwrap();
    assert!(host.move_caret(CaretMove::DocumentEnd, false).unwrap().is_committed());
    assert_eq!(seen.borrow().len(), 2);
    assert!(host.insert_text("x").unwrap_err().is_read_only());
    let state = host.state();
    assert_eq!(state.caret(), Some(state.last_caret()));
    assert_eq!(host.snapshot(), snapshot);
}

#[test]
fn read_only_host_refuses_commands() {
    let editor = Editor::new(&EditorConfig::default().with_editable(false), None).unwrap();
    let mut host = PluginHost::new(
        editor,
        vec![Box::new(HistoryPlugin), Box::new(HorizontalRuleCommand)],
    )
    .unwrap();
    let before = host.snapshot();
    assert!(host.insert_horizontal_rule().unwrap_err().is_read_only());
    assert!(host.insert_text("x").unwrap_err().is_read_only());
    assert!(host.undo().unwrap_err().is_read_only());
    assert_eq!(host.snapshot(), before);
}

#[test]
fn default_set_wires_everything() {
    let changes = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&changes);
    let mut host = PluginHost::with_defaults(&EditorConfig::default(), None, move |_| {
        *counter.borrow_mut() += 1;
    })
    .unwrap();
    host.mount();
    assert!(host.editor().is_focused());
    assert_eq!(
        host.plugin_names(),
        vec![
            "autofocus",
            "history",
            "markdown-shortcuts",
            "horizontal-rule",
            "change-notifier"
        ]
    );
    type_chars(&mut host, "## ");
    assert_eq!(host.state().outline(), "root[h2]");
    assert_eq!(*changes.borrow(), 4);
}
