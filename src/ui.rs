use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hsa_ledger::{
    display_date, export_filename, export_to_file, filter_expenses, summarize, tax_years,
    total_for, ExpenseQuery, ExpenseRecord, ExpenseStore, ExpenseUpdate, Subscription,
    TaxYearFilter,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use chrono::Datelike;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Ledger,
    TaxYears,
    Summary,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Ledger => Page::TaxYears,
            Page::TaxYears => Page::Summary,
            Page::Summary => Page::Ledger,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Ledger => Page::Summary,
            Page::TaxYears => Page::Ledger,
            Page::Summary => Page::TaxYears,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct App {
    store: ExpenseStore,
    subscription: Subscription,
    pub records: Vec<ExpenseRecord>,
    pub filtered: Vec<ExpenseRecord>,
    pub years: Vec<i32>,
    pub query: ExpenseQuery,
    pub state: TableState,
    pub years_state: TableState,
    pub current_page: Page,
    pub input_mode: InputMode,
    pub show_detail: bool,
    /// Id awaiting a `y` to confirm deletion
    pub pending_delete: Option<String>,
    pub status: Option<String>,
    export_dir: PathBuf,
}

impl App {
    pub fn new(store: ExpenseStore, owner_id: &str, export_dir: PathBuf) -> Self {
        let subscription = store.subscribe(owner_id);
        let mut years_state = TableState::default();
        years_state.select(Some(0));

        let mut app = Self {
            store,
            subscription,
            records: Vec::new(),
            filtered: Vec::new(),
            years: Vec::new(),
            query: ExpenseQuery::default(),
            state: TableState::default(),
            years_state,
            current_page: Page::Ledger,
            input_mode: InputMode::Normal,
            show_detail: false,
            pending_delete: None,
            status: None,
            export_dir,
        };
        app.refresh();
        app
    }

    pub fn owner_id(&self) -> &str {
        self.subscription.owner_id()
    }

    /// Pull the latest snapshot if anything changed since the last call
    pub fn refresh(&mut self) {
        match self.subscription.try_snapshot() {
            Some(Ok(records)) => self.set_records(records),
            Some(Err(e)) => self.status = Some(format!("Refresh failed: {}", e.user_message())),
            None => {}
        }
    }

    /// Re-read the table; picks up writes made by other processes
    pub fn reload(&mut self) {
        match self.store.list(self.owner_id()) {
            Ok(records) => self.set_records(records),
            Err(e) => self.status = Some(format!("Reload failed: {}", e.user_message())),
        }
    }

    pub fn set_records(&mut self, records: Vec<ExpenseRecord>) {
        self.records = records;
        self.years = tax_years(&self.records);
        // A year that no longer has records falls back to All
        if let TaxYearFilter::Year(year) = self.query.tax_year {
            if !self.years.contains(&year) {
                self.query.tax_year = TaxYearFilter::All;
            }
        }
        self.apply_query();
    }

    fn apply_query(&mut self) {
        self.filtered = filter_expenses(&self.records, &self.query);

        let selected = match self.state.selected() {
            _ if self.filtered.is_empty() => None,
            Some(i) => Some(i.min(self.filtered.len() - 1)),
            None => Some(0),
        };
        self.state.select(selected);
    }

    pub fn selected_expense(&self) -> Option<&ExpenseRecord> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    pub fn filtered_total(&self) -> f64 {
        total_for(&self.filtered)
    }

    pub fn cycle_tax_year(&mut self) {
        self.query.tax_year = self.query.tax_year.next(&self.years);
        self.state.select(Some(0));
        self.apply_query();
    }

    pub fn set_tax_year(&mut self, tax_year: TaxYearFilter) {
        self.query.tax_year = tax_year;
        self.state.select(Some(0));
        self.apply_query();
    }

    pub fn push_search(&mut self, c: char) {
        self.query.search.push(c);
        self.apply_query();
    }

    pub fn pop_search(&mut self) {
        self.query.search.pop();
        self.apply_query();
    }

    pub fn clear_filters(&mut self) {
        self.query = ExpenseQuery::default();
        self.apply_query();
    }

    pub fn request_delete(&mut self) {
        let Some(expense) = self.selected_expense() else {
            return;
        };
        let prompt = format!(
            "Delete '{}' from {}? (y to confirm)",
            expense.item_name, expense.merchant
        );
        self.pending_delete = Some(expense.id.clone());
        self.status = Some(prompt);
    }

    pub fn confirm_delete(&mut self) {
        let Some(id) = self.pending_delete.take() else {
            return;
        };
        self.status = Some(match self.store.delete(self.owner_id(), &id) {
            Ok(()) => "Expense deleted".to_string(),
            Err(e) => format!("Delete failed: {}", e.user_message()),
        });
        self.refresh();
    }

    pub fn cancel_delete(&mut self) {
        if self.pending_delete.take().is_some() {
            self.status = None;
        }
    }

    pub fn toggle_reimbursed(&mut self) {
        let Some(expense) = self.selected_expense() else {
            return;
        };
        let id = expense.id.clone();
        let update = ExpenseUpdate {
            reimbursed: Some(!expense.reimbursed),
            ..Default::default()
        };

        self.status = Some(match self.store.update(self.owner_id(), &id, &update) {
            Ok(updated) if updated.reimbursed => "Marked as reimbursed".to_string(),
            Ok(_) => "Marked as outstanding".to_string(),
            Err(e) => format!("Update failed: {}", e.user_message()),
        });
        self.refresh();
    }

    /// Write the filtered view to `HSA_Expenses_<year>.csv`
    pub fn export(&mut self) -> Option<PathBuf> {
        let path = self.export_dir.join(export_filename(self.query.tax_year));
        match export_to_file(&self.filtered, &path) {
            Ok(summary) => {
                self.status = Some(format!(
                    "Exported {} rows (${:.2}) to {}",
                    summary.rows_written,
                    summary.total,
                    path.display()
                ));
                Some(path)
            }
            Err(e) => {
                self.status = Some(format!("Export failed: {}", e));
                None
            }
        }
    }

    /// (year, count, total) for the Tax Years page, newest first
    pub fn year_summary(&self) -> Vec<(i32, usize, f64)> {
        self.years
            .iter()
            .map(|year| {
                let in_year: Vec<ExpenseRecord> = self
                    .records
                    .iter()
                    .filter(|r| r.date.year() == *year)
                    .cloned()
                    .collect();
                (*year, in_year.len(), total_for(&in_year))
            })
            .collect()
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::TaxYears => (&mut self.years_state, self.years.len()),
            _ => (&mut self.state, self.filtered.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
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

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    let mut last_reload = Instant::now();
    loop {
        app.refresh();
        if last_reload.elapsed() >= RELOAD_INTERVAL {
            app.reload();
            last_reload = Instant::now();
        }
        terminal.draw(|f| ui(f, app))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.input_mode == InputMode::Search {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => app.input_mode = InputMode::Normal,
                KeyCode::Backspace => app.pop_search(),
                KeyCode::Char(c) => app.push_search(c),
                _ => {}
            }
            continue;
        }

        if app.pending_delete.is_some() {
            match key.code {
                KeyCode::Char('y') => app.confirm_delete(),
                _ => app.cancel_delete(),
            }
            continue;
        }

        app.status = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Enter if app.current_page == Page::TaxYears => {
                if let Some(year) = app.years_state.selected().and_then(|i| app.years.get(i).copied()) {
                    app.set_tax_year(TaxYearFilter::Year(year));
                    app.current_page = Page::Ledger;
                }
            }
            KeyCode::Enter => app.show_detail = !app.show_detail,
            KeyCode::Tab => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    app.previous_page();
                } else {
                    app.next_page();
                }
            }
            KeyCode::BackTab => app.previous_page(),
            KeyCode::Char('/') => {
                app.input_mode = InputMode::Search;
                app.current_page = Page::Ledger;
            }
            KeyCode::Char('t') => app.cycle_tax_year(),
            KeyCode::Char('c') => app.clear_filters(),
            KeyCode::Char('d') if app.current_page == Page::Ledger => app.request_delete(),
            KeyCode::Char('r') if app.current_page == Page::Ledger => app.toggle_reimbursed(),
            KeyCode::Char('e') => {
                app.export();
            }
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            KeyCode::PageDown => app.page_down(),
            KeyCode::PageUp => app.page_up(),
            KeyCode::Home => app.state.select(Some(0)),
            KeyCode::End => {
                if !app.filtered.is_empty() {
                    app.state.select(Some(app.filtered.len() - 1));
                }
            }
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Ledger {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Ledger => render_table(f, chunks[1], app),
            Page::TaxYears => render_tax_years(f, chunks[1], app),
            Page::Summary => render_summary(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [
        (Page::Ledger, "Ledger"),
        (Page::TaxYears, "Tax Years"),
        (Page::Summary, "Summary"),
    ];

    let mut tab_spans = vec![];
    for (i, (page, name)) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(*name, style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        app.query.tax_year.label(),
        Style::default().fg(Color::Cyan),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("{} items", app.filtered.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Total ${:.2}", app.filtered_total()),
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" HSA Expense Ledger "),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1)
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["Date", "Merchant", "Item", "Price", "Tax", "Total", "Paid"]);

    let rows = app.filtered.iter().map(|expense| {
        let paid = if expense.reimbursed {
            Cell::from("✓").style(Style::default().fg(Color::Green))
        } else {
            Cell::from("")
        };

        Row::new(vec![
            Cell::from(expense.date.format("%Y-%m-%d").to_string()),
            Cell::from(truncate(&expense.merchant, 22)),
            Cell::from(truncate(&expense.item_name, 30)),
            Cell::from(format!("{:.2}", expense.price)),
            Cell::from(format!("{:.2}", expense.tax)),
            Cell::from(format!("{:.2}", expense.total_price))
                .style(Style::default().fg(Color::Green)),
            paid,
        ])
        .height(1)
    });

    let title = if app.query.search.is_empty() {
        " Expenses ".to_string()
    } else {
        format!(" Expenses matching '{}' ", app.query.search)
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(24),
            Constraint::Length(32),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(5),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_tax_years(f: &mut Frame, area: Rect, app: &mut App) {
    let header = header_row(&["Tax Year", "Items", "Total"]);
    let summary = app.year_summary();

    let rows = summary.iter().map(|(year, count, total)| {
        let style = if app.query.tax_year == TaxYearFilter::Year(*year) {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(year.to_string()),
            Cell::from(count.to_string()),
            Cell::from(format!("{:.2}", total)).style(Style::default().fg(Color::Green)),
        ])
        .style(style)
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Tax Years - Enter to filter the ledger "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.years_state);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let summary = summarize(&app.filtered);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let peak = summary
        .monthly
        .iter()
        .map(|m| m.total)
        .fold(0.0_f64, f64::max);

    let mut monthly_lines = vec![Line::from("")];
    for month in &summary.monthly {
        let width = if peak > 0.0 {
            ((month.total / peak) * 24.0).round() as usize
        } else {
            0
        };
        monthly_lines.push(Line::from(vec![
            Span::styled(format!("  {} ", month.month), Style::default().fg(Color::Cyan)),
            Span::styled("█".repeat(width), Style::default().fg(Color::Green)),
            Span::raw(format!(" {:.2}", month.total)),
        ]));
    }
    monthly_lines.push(Line::from(""));
    monthly_lines.push(Line::from(vec![
        Span::styled("  Reimbursed: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(
            format!("{:.2}", summary.reimbursement.reimbursed),
            Style::default().fg(Color::Green),
        ),
    ]));
    monthly_lines.push(Line::from(vec![
        Span::styled("  Outstanding: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(
            format!("{:.2}", summary.reimbursement.outstanding),
            Style::default().fg(Color::Yellow),
        ),
    ]));

    let monthly = Paragraph::new(monthly_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Spending by Month "),
    );
    f.render_widget(monthly, halves[0]);

    let rows = summary.by_merchant.iter().map(|m| {
        Row::new(vec![
            Cell::from(truncate(&m.merchant, 26)),
            Cell::from(m.count.to_string()),
            Cell::from(format!("{:.2}", m.total)).style(Style::default().fg(Color::Green)),
        ])
    });
    let merchants = Table::new(
        rows,
        [
            Constraint::Length(28),
            Constraint::Length(8),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Merchant", "Items", "Total"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Spending by Merchant "),
    );
    f.render_widget(merchants, halves[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let status_spans = if app.input_mode == InputMode::Search {
        vec![
            Span::styled(" Search: ", Style::default().fg(Color::Cyan)),
            Span::raw(app.query.search.clone()),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
            Span::raw("  ("),
            key("Enter"),
            Span::raw(" done)"),
        ]
    } else if let Some(message) = &app.status {
        vec![Span::styled(
            format!(" {}", message),
            Style::default().fg(Color::Green),
        )]
    } else {
        let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
        vec![
            Span::styled(
                format!(" Row: {}/{} ", selected, app.filtered.len()),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("| "),
            key("/"),
            Span::raw(" Search | "),
            key("t"),
            Span::raw(" Year | "),
            key("r"),
            Span::raw(" Reimbursed | "),
            key("d"),
            Span::raw(" Delete | "),
            key("e"),
            Span::raw(" Export | "),
            key("c"),
            Span::raw(" Clear | "),
            key("Tab"),
            Span::raw(" Page | "),
            Span::styled("q", Style::default().fg(Color::Red)),
            Span::raw(" Quit"),
        ]
    };

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
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(expense) = app.selected_expense() else {
        let no_selection = Paragraph::new("No expense selected").block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Expense Details "),
        );
        f.render_widget(no_selection, area);
        return;
    };

    let label = |text: &'static str| {
        Span::styled(text, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };
    let yes_no = |flag: bool| {
        if flag {
            Span::styled("Yes", Style::default().fg(Color::Green))
        } else {
            Span::styled("No", Style::default().fg(Color::Red))
        }
    };

    let content = vec![
        Line::from(""),
        Line::from(vec![label("  Date: "), Span::raw(display_date(expense.date))]),
        Line::from(""),
        Line::from(vec![label("  Merchant: "), Span::raw(expense.merchant.clone())]),
        Line::from(""),
        Line::from(vec![
            label("  Item: "),
            Span::raw(wrap_text(&expense.item_name, 35)),
        ]),
        Line::from(""),
        Line::from(vec![label("  Price: "), Span::raw(format!("{:.2}", expense.price))]),
        Line::from(vec![label("  Tax: "), Span::raw(format!("{:.2}", expense.tax))]),
        Line::from(vec![
            label("  Total: "),
            Span::styled(
                format!("{:.2}", expense.total_price),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(vec![label("  HSA Eligible: "), yes_no(expense.hsa_eligible)]),
        Line::from(vec![label("  Reimbursed: "), yes_no(expense.reimbursed)]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  PROVENANCE",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )]),
        Line::from(""),
        Line::from(vec![
            label("  Source: "),
            Span::styled(expense.source.clone(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            label("  Added: "),
            Span::raw(expense.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]),
        Line::from(vec![
            label("  Id: "),
            Span::styled(expense.id.clone(), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )]),
    ];

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Expense Details "),
    );

    f.render_widget(detail_panel, area);
}

fn wrap_text(text: &str, width: usize) -> String {
    if text.len() <= width {
        return text.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current_line = String::new();
    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current_line));
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }
    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines.join("\n  ")
}
