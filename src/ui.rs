use crate::error::LedgerError;
use crate::ledger::Entry;
use crate::tracker::ExpenseTracker;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Category,
    Amount { category: String },
}

/// How the UI was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Saved,
    Aborted,
}

pub struct App {
    pub tracker: ExpenseTracker,
    pub state: TableState,
    pub mode: InputMode,
    pub input: String,
    pub status: String,
    pub status_is_error: bool,
    pub exit: Option<UiExit>,
    /// Unrecoverable core error; closes the UI and is returned by `run_ui`
    pub fatal: Option<LedgerError>,
}

impl App {
    pub fn new(tracker: ExpenseTracker, status: String) -> Self {
        let mut state = TableState::default();
        if !tracker.list().is_empty() {
            state.select(Some(0));
        }

        Self {
            tracker,
            state,
            mode: InputMode::Normal,
            input: String::new(),
            status,
            status_is_error: false,
            exit: None,
            fatal: None,
        }
    }

    fn set_status(&mut self, message: String, is_error: bool) {
        self.status = message;
        self.status_is_error = is_error;
    }

    /// Show a core error in the status bar, or keep it as fatal when
    /// resources ran out.
    pub fn record_error(&mut self, err: LedgerError) {
        if err.is_resource() {
            self.fatal = Some(err);
        } else {
            self.set_status(err.to_string(), true);
        }
    }

    pub fn start_add(&mut self) {
        self.mode = InputMode::Category;
        self.input.clear();
        self.set_status("Enter category, then Enter (Esc cancels)".to_string(), false);
    }

    pub fn cancel_input(&mut self) {
        self.mode = InputMode::Normal;
        self.input.clear();
        self.set_status("Cancelled".to_string(), false);
    }

    /// Enter pressed while typing.
    pub fn submit_input(&mut self) {
        let value = std::mem::take(&mut self.input);
        match std::mem::replace(&mut self.mode, InputMode::Normal) {
            InputMode::Normal => {}
            InputMode::Category => {
                self.mode = InputMode::Amount { category: value };
                self.set_status("Enter amount, then Enter (Esc cancels)".to_string(), false);
            }
            InputMode::Amount { category } => match self.tracker.add(&category, &value) {
                Ok(entry) => {
                    let message = format!("Added expense: {} - ${}", entry.category(), entry.amount());
                    self.set_status(message, false);
                    let last = self.tracker.list().len() - 1;
                    self.state.select(Some(last));
                }
                Err(err) => {
                    // Re-prompt for the amount, keeping the category
                    self.mode = InputMode::Amount { category };
                    self.record_error(err);
                }
            },
        }
    }

    pub fn show_total(&mut self) {
        match self.tracker.total() {
            Ok(total) => self.set_status(format!("Total spending: ${}", total), false),
            Err(err) => self.record_error(err),
        }
    }

    /// Blocks until the save task is terminal. Leaves the UI only on success.
    pub fn save_and_exit(&mut self) {
        match self.tracker.save_and_wait() {
            Ok(report) if report.succeeded() => {
                self.set_status(format!("Expenses saved to file: {}", report.destination), false);
                self.exit = Some(UiExit::Saved);
            }
            Ok(report) => {
                let reason = report
                    .error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                self.set_status(format!("Unable to save expenses to file. {}", reason), true);
            }
            Err(err) => self.record_error(err),
        }
    }

    pub fn next(&mut self) {
        let len = self.tracker.list().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.tracker.list().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Returns true once the app should close.
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            self.exit = Some(UiExit::Aborted);
            return true;
        }

        if self.mode != InputMode::Normal {
            match code {
                KeyCode::Esc => self.cancel_input(),
                KeyCode::Enter => self.submit_input(),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            }
            return self.fatal.is_some();
        }

        match code {
            KeyCode::Char('a') | KeyCode::Char('1') => self.start_add(),
            KeyCode::Char('t') | KeyCode::Char('3') => self.show_total(),
            KeyCode::Char('s') | KeyCode::Char('4') => self.save_and_exit(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Home => {
                if !self.tracker.list().is_empty() {
                    self.state.select(Some(0));
                }
            }
            KeyCode::End => {
                if !self.tracker.list().is_empty() {
                    self.state.select(Some(self.tracker.list().len() - 1));
                }
            }
            _ => {}
        }

        self.exit.is_some() || self.fatal.is_some()
    }
}

pub fn run_ui(app: &mut App) -> Result<UiExit> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    if let Some(err) = app.fatal.take() {
        return Err(err.into());
    }
    Ok(app.exit.unwrap_or(UiExit::Aborted))
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if app.handle_key(key.code, key.modifiers) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Entries
            Constraint::Length(3), // Input line
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_table(f, chunks[1], app);
    render_input(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let spans = vec![
        Span::styled(
            "Personal Expense Tracker",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Entries: {}", app.tracker.list().len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Store: {}", app.tracker.store().path().display()),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["#", "Category", "Amount"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.tracker.list().iter().enumerate().map(|(i, entry): (usize, &Entry)| {
        Row::new(vec![
            Cell::from((i + 1).to_string()),
            Cell::from(truncate(entry.category(), 40)),
            Cell::from(format!("${}", entry.amount())).style(Style::default().fg(Color::Red)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(42),
            Constraint::Length(16),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Recorded Expenses "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let (title, style) = match &app.mode {
        InputMode::Normal => (" Input ".to_string(), Style::default().fg(Color::DarkGray)),
        InputMode::Category => (" Category ".to_string(), Style::default().fg(Color::Yellow)),
        InputMode::Amount { category } => (
            format!(" Amount for '{}' ($) ", truncate(category, 30)),
            Style::default().fg(Color::Yellow),
        ),
    };

    let input = Paragraph::new(app.input.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(input, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status_color = if app.status_is_error { Color::Red } else { Color::Green };

    let mut status_spans = vec![
        Span::styled(format!(" {} ", app.status), Style::default().fg(status_color)),
        Span::raw(" | "),
    ];

    if app.mode == InputMode::Normal {
        status_spans.push(Span::styled("a", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Add | "));
        status_spans.push(Span::styled("t", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Total | "));
        status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Nav | "));
        status_spans.push(Span::styled("s", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Save & Exit"));
    } else {
        status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Confirm | "));
        status_spans.push(Span::styled("Esc", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Cancel"));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
