use std::{
    cell::Cell,
    env,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

use richstep::editor::{
    BlockType, CaretMove, DocumentState, NodeData, NodeId, NodeKind, PluginHost, Snapshot,
    TextFormat,
};
use richstep::{Editor, EditorConfig, EditorError, export};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExportFormat {
    Ftml,
    Markdown,
    Steps,
}

impl ExportFormat {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") | Some("mkd") => ExportFormat::Markdown,
            Some("txt") => ExportFormat::Steps,
            _ => ExportFormat::Ftml,
        }
    }

    fn render(self, state: &DocumentState) -> Result<String> {
        let rendered = match self {
            ExportFormat::Ftml => export::to_ftml(state).context("failed to render FTML")?,
            ExportFormat::Markdown => {
                export::to_markdown(state).context("failed to render Markdown")?
            }
            ExportFormat::Steps => {
                let mut lines = export::step_lines(state).join("\n");
                lines.push('\n');
                lines
            }
        };
        Ok(rendered)
    }
}

fn main() -> Result<()> {
    run()
}

/// Logs go to the file named by `RICHSTEP_LOG`; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let Some(log_path) = env::var_os("RICHSTEP_LOG") else {
        return Ok(());
    };
    let file = File::create(&log_path)
        .with_context(|| format!("failed to create log file {}", Path::new(&log_path).display()))?;
    if tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .is_err()
    {
        eprintln!("tracing subscriber already installed");
    }
    Ok(())
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(path_arg) = args.next() else {
        eprintln!("Usage: richstep <steps.json> [--export <file.md|file.ftml|file.txt>]");
        return Ok(());
    };
    let path = PathBuf::from(path_arg);
    init_logging()?;
    let config = EditorConfig::from_env();

    if let Some(flag) = args.next() {
        if flag != "--export" {
            bail!("unknown argument {flag}");
        }
        let target = args
            .next()
            .map(PathBuf::from)
            .context("--export needs a target file")?;
        return export_file(&path, &target, &config);
    }

    let (snapshot, initial_status) = load_snapshot(&path)?;
    let mut app = App::new(&config, snapshot.as_ref(), path, initial_status)?;
    app.host.mount();

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to initialize terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().ok();

    let res = run_app(&mut terminal, &mut app).context("application error");

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn load_snapshot(path: &Path) -> Result<(Option<Snapshot>, Option<String>)> {
    if !path.exists() {
        return Ok((None, Some("New document".to_string())));
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot = Snapshot::from_json(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok((Some(snapshot), None))
}

fn export_file(path: &Path, target: &Path, config: &EditorConfig) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot = Snapshot::from_json(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let editor = Editor::new(config, Some(&snapshot))
        .with_context(|| format!("failed to load {}", path.display()))?;
    let contents = ExportFormat::from_path(target).render(&editor.state())?;
    fs::write(target, contents).with_context(|| format!("failed to write {}", target.display()))?;
    info!(source = %path.display(), target = %target.display(), "document exported");
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();
    let mut needs_redraw = true;

    while !app.should_quit {
        if needs_redraw {
            terminal
                .draw(|frame| app.draw(frame))
                .context("failed to draw frame")?;
            needs_redraw = false;
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout).context("event poll failed")? {
            let evt = event::read().context("failed to read event")?;
            app.handle_event(evt)?;
            needs_redraw = true;
        }

        if last_tick.elapsed() >= tick_rate {
            let had_message_before = app.status_message.is_some();
            app.prune_status_message();
            last_tick = Instant::now();
            if had_message_before && app.status_message.is_none() {
                needs_redraw = true;
            }
        }
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Rendered {
    lines: Vec<Line<'static>>,
    /// Line index and display column of the caret.
    caret: Option<(usize, u16)>,
}

fn format_style(format: TextFormat) -> Style {
    let mut style = Style::default();
    for (flag, modifier) in [
        (TextFormat::BOLD, Modifier::BOLD),
        (TextFormat::ITALIC, Modifier::ITALIC),
        (TextFormat::UNDERLINE, Modifier::UNDERLINED),
        (TextFormat::STRIKETHROUGH, Modifier::CROSSED_OUT),
    ] {
        if format.contains(flag) {
            style = style.add_modifier(modifier);
        }
    }
    if format.contains(TextFormat::CODE) {
        style = style.fg(Color::Cyan);
    }
    if format.contains(TextFormat::HIGHLIGHT) {
        style = style.bg(Color::Yellow).fg(Color::Black);
    }
    style
}

fn push_text_line(
    state: &DocumentState,
    block: NodeId,
    prefix: String,
    base: Style,
    caret: Option<(NodeId, usize)>,
    rendered: &mut Rendered,
) {
    if let Some((caret_block, offset)) = caret
        && caret_block == block
    {
        let before: String = state.block_text(block).chars().take(offset).collect();
        let column = prefix.width() + before.width();
        rendered.caret = Some((rendered.lines.len(), u16::try_from(column).unwrap_or(u16::MAX)));
    }
    let mut spans = vec![Span::styled(prefix, Style::default().fg(Color::DarkGray))];
    for node in state
        .text_children(block)
        .into_iter()
        .filter_map(|id| state.node(id))
    {
        if let (Some(text), Some(format)) = (node.text(), node.format()) {
            spans.push(Span::styled(text.to_string(), base.patch(format_style(format))));
        }
    }
    rendered.lines.push(Line::from(spans));
}

fn render_block(
    state: &DocumentState,
    block: NodeId,
    depth: usize,
    width: u16,
    caret: Option<(NodeId, usize)>,
    rendered: &mut Rendered,
) {
    let Some(node) = state.node(block) else {
        return;
    };
    match node.data() {
        NodeData::Paragraph => {
            push_text_line(state, block, String::new(), Style::default(), caret, rendered);
        }
        NodeData::Heading { level } => {
            let prefix = format!("{} ", "#".repeat(usize::from(*level)));
            let style = Style::default().add_modifier(Modifier::BOLD);
            push_text_line(state, block, prefix, style, caret, rendered);
        }
        NodeData::HorizontalRule => {
            let rule = "─".repeat(usize::from(width.max(1)));
            rendered
                .lines
                .push(Line::styled(rule, Style::default().fg(Color::DarkGray)));
        }
        NodeData::List { ordered } => {
            let indent = "  ".repeat(depth);
            for (index, item) in state.children(block).iter().enumerate() {
                let marker = if *ordered {
                    format!("{indent}{}. ", index + 1)
                } else {
                    format!("{indent}• ")
                };
                push_text_line(state, *item, marker, Style::default(), caret, rendered);
                for nested in state.children(*item) {
                    if state.kind(*nested) == Some(NodeKind::List) {
                        render_block(state, *nested, depth + 1, width, caret, rendered);
                    }
                }
            }
        }
        NodeData::Root | NodeData::ListItem | NodeData::Text { .. } => {}
    }
}

fn render_state(state: &DocumentState, width: u16) -> Rendered {
    let mut rendered = Rendered::default();
    let caret = state.caret().and_then(|point| state.block_offset(point));
    for block in state.children(state.root()) {
        render_block(state, *block, 0, width, caret, &mut rendered);
    }
    rendered
}

struct App {
    host: PluginHost,
    file_path: PathBuf,
    dirty: Rc<Cell<bool>>,
    scroll_top: usize,
    should_quit: bool,
    status_message: Option<(String, Instant)>,
}

impl App {
    fn new(
        config: &EditorConfig,
        snapshot: Option<&Snapshot>,
        path: PathBuf,
        initial_status: Option<String>,
    ) -> Result<Self> {
        let dirty = Rc::new(Cell::new(false));
        let flag = Rc::clone(&dirty);
        let host = PluginHost::with_defaults(config, snapshot, move |_| flag.set(true))
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(Self {
            host,
            file_path: path,
            dirty,
            scroll_top: 0,
            should_quit: false,
            status_message: initial_status.map(|msg| (msg, Instant::now())),
        })
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn prune_status_message(&mut self) {
        if let Some((_, instant)) = &self.status_message
            && instant.elapsed() > STATUS_TIMEOUT
        {
            self.status_message = None;
        }
    }

    fn save(&mut self) -> Result<()> {
        let contents = self
            .host
            .snapshot()
            .to_json_pretty()
            .context("failed to encode document")?;
        fs::write(&self.file_path, contents)
            .with_context(|| format!("failed to write {}", self.file_path.display()))?;
        self.dirty.set(false);
        self.set_status("Saved");
        Ok(())
    }

    fn export_markdown(&mut self) -> Result<()> {
        let target = self.file_path.with_extension("md");
        let contents = ExportFormat::Markdown.render(&self.host.state())?;
        fs::write(&target, contents)
            .with_context(|| format!("failed to write {}", target.display()))?;
        self.set_status(format!("Exported {}", target.display()));
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        {
            self.handle_key(code, modifiers)?;
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);
        let shift = modifiers.contains(KeyModifiers::SHIFT);
        let host = &mut self.host;
        let outcome: Result<(), EditorError> = match (code, ctrl) {
            (KeyCode::Char('q'), true) | (KeyCode::Char('c'), true) => {
                self.should_quit = true;
                return Ok(());
            }
            (KeyCode::Char('s'), true) => return self.save(),
            (KeyCode::Char('e'), true) => return self.export_markdown(),
            (KeyCode::Char('z'), true) => host.undo(),
            (KeyCode::Char('y'), true) => host.redo(),
            (KeyCode::Char('r'), true) => host.insert_horizontal_rule(),
            (KeyCode::Char('b'), true) => host.toggle_format(TextFormat::BOLD).map(drop),
            (KeyCode::Char('u'), true) => host.toggle_format(TextFormat::UNDERLINE).map(drop),
            (KeyCode::Char('k'), true) => host.toggle_format(TextFormat::CODE).map(drop),
            (KeyCode::Char('a'), true) => host.editor_mut().select_all().map(drop),
            (KeyCode::Char('0'), true) => host.set_block_type(BlockType::Paragraph).map(drop),
            (KeyCode::Char(digit @ '1'..='3'), true) => {
                let level = digit as u8 - b'0';
                host.set_block_type(BlockType::Heading(level)).map(drop)
            }
            (KeyCode::Char('l'), true) => host
                .set_block_type(BlockType::List { ordered: false })
                .map(drop),
            (KeyCode::Char('o'), true) => host
                .set_block_type(BlockType::List { ordered: true })
                .map(drop),
            (KeyCode::Char(ch), false) => host.insert_text(&ch.to_string()).map(drop),
            (KeyCode::Enter, _) => host.insert_paragraph_break().map(drop),
            (KeyCode::Backspace, _) => host.delete_backward().map(drop),
            (KeyCode::Delete, _) => host.delete_forward().map(drop),
            (KeyCode::Left, true) => host.move_caret(CaretMove::WordLeft, shift).map(drop),
            (KeyCode::Right, true) => host.move_caret(CaretMove::WordRight, shift).map(drop),
            (KeyCode::Left, false) => host.move_caret(CaretMove::Left, shift).map(drop),
            (KeyCode::Right, false) => host.move_caret(CaretMove::Right, shift).map(drop),
            (KeyCode::Up, _) => host.move_caret(CaretMove::Up, shift).map(drop),
            (KeyCode::Down, _) => host.move_caret(CaretMove::Down, shift).map(drop),
            (KeyCode::Home, true) => host.move_caret(CaretMove::DocumentStart, shift).map(drop),
            (KeyCode::End, true) => host.move_caret(CaretMove::DocumentEnd, shift).map(drop),
            (KeyCode::Home, false) => host.move_caret(CaretMove::LineStart, shift).map(drop),
            (KeyCode::End, false) => host.move_caret(CaretMove::LineEnd, shift).map(drop),
            _ => Ok(()),
        };
        match outcome {
            Ok(()) => {}
            Err(err) if err.is_read_only() => self.set_status("Document is read-only"),
            Err(err) => {
                warn!(error = %err, "command failed");
                self.set_status(err.to_string());
            }
        }
        Ok(())
    }

    fn adjust_scroll(&mut self, caret_line: Option<usize>, viewport: usize) {
        let viewport = viewport.max(1);
        let Some(line) = caret_line else {
            return;
        };
        if line < self.scroll_top {
            self.scroll_top = line;
        } else if line >= self.scroll_top + viewport {
            self.scroll_top = line + 1 - viewport;
        }
    }

    fn status_line(&self, caret: Option<(usize, u16)>) -> Line<'static> {
        let position = match caret {
            Some((line, column)) => format!("{}:{}", line + 1, column + 1),
            None => "-:-".to_string(),
        };
        if let Some((message, _)) = &self.status_message {
            return Line::from(vec![
                Span::raw(format!("{position} ")),
                Span::raw(message.clone()),
            ]);
        }

        let marker = if self.dirty.get() { "*" } else { "" };
        let mut spans = vec![
            Span::styled(position, Style::default().fg(Color::White)),
            Span::raw(" "),
            Span::styled(
                format!("{}{}", self.file_path.display(), marker),
                Style::default().fg(Color::Yellow),
            ),
        ];
        if !self.host.editor().is_editable() {
            spans.push(Span::raw(" [read-only]"));
        }
        for chrome in self.host.chrome() {
            spans.push(Span::raw(format!(", {chrome}")));
        }
        spans.push(Span::raw("  ^S:Save ^E:Export ^Q:Quit"));
        Line::from(spans)
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if area.height == 0 || area.width == 0 {
            return;
        }

        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let text_area = vertical[0];
        let status_area = vertical[1];

        let state = self.host.state();
        let rendered = render_state(&state, text_area.width);
        let viewport_height = text_area.height as usize;
        self.adjust_scroll(rendered.caret.map(|(line, _)| line), viewport_height);

        let paragraph = Paragraph::new(Text::from(rendered.lines.clone()))
            .block(Block::default().borders(Borders::NONE))
            .scroll((u16::try_from(self.scroll_top).unwrap_or(u16::MAX), 0));
        frame.render_widget(paragraph, text_area);

        if self.host.editor().is_focused()
            && let Some((line, column)) = rendered.caret
            && line >= self.scroll_top
            && line < self.scroll_top + viewport_height
        {
            let cursor_y = text_area.y + (line - self.scroll_top) as u16;
            let cursor_x = text_area.x + column.min(text_area.width - 1);
            frame.set_cursor_position(Position::new(cursor_x, cursor_y));
        }

        let status_widget = Paragraph::new(self.status_line(rendered.caret))
            .block(Block::default().borders(Borders::NONE))
            .style(Style::default().bg(Color::Blue).fg(Color::White));
        frame.render_widget(status_widget, status_area);
    }
}
