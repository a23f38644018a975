use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use park_it::{
    get_all_spots, get_occupancy, get_open_tickets, Occupancy, ParkingSpot, SqliteStore, Ticket,
    VehicleCategory,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Spots,
    Tickets,
}

impl Panel {
    pub fn next(&self) -> Self {
        match self {
            Panel::Spots => Panel::Tickets,
            Panel::Tickets => Panel::Spots,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Panel::Spots => "Spots",
            Panel::Tickets => "Open Tickets",
        }
    }
}

pub struct App {
    store: SqliteStore,
    pub spots: Vec<ParkingSpot>,
    pub open_tickets: Vec<Ticket>,
    pub occupancy: Vec<Occupancy>,
    pub panel: Panel,
    pub spots_state: TableState,
    pub tickets_state: TableState,
    pub last_error: Option<String>,
}

impl App {
    pub fn load(store: SqliteStore) -> Result<Self> {
        let mut app = App {
            store,
            spots: Vec::new(),
            open_tickets: Vec::new(),
            occupancy: Vec::new(),
            panel: Panel::Spots,
            spots_state: TableState::default(),
            tickets_state: TableState::default(),
            last_error: None,
        };
        app.refresh()?;
        Ok(app)
    }

    /// Reload spots, open tickets and occupancy from the database
    pub fn refresh(&mut self) -> Result<()> {
        self.spots = self.store.with_connection(get_all_spots)?;
        self.open_tickets = self.store.with_connection(get_open_tickets)?;
        self.occupancy = self.store.with_connection(get_occupancy)?;

        clamp_selection(&mut self.spots_state, self.spots.len());
        clamp_selection(&mut self.tickets_state, self.open_tickets.len());
        Ok(())
    }

    fn refresh_or_report(&mut self) {
        self.last_error = self.refresh().err().map(|e| e.to_string());
    }

    fn active(&mut self) -> (&mut TableState, usize) {
        match self.panel {
            Panel::Spots => (&mut self.spots_state, self.spots.len()),
            Panel::Tickets => (&mut self.tickets_state, self.open_tickets.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn switch_panel(&mut self) {
        self.panel = self.panel.next();
    }
}

fn clamp_selection(state: &mut TableState, len: usize) {
    match (state.selected(), len) {
        (_, 0) => state.select(None),
        (None, _) => state.select(Some(0)),
        (Some(i), len) if i >= len => state.select(Some(len - 1)),
        _ => {}
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
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
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('r') => app.refresh_or_report(),
                KeyCode::Tab => app.switch_panel(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Occupancy header
            Constraint::Min(0),    // Spots | tickets
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    render_spots(f, content[0], app);
    render_tickets(f, content[1], app);

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        "Park It",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];

    for occ in &app.occupancy {
        let color = if occ.available == 0 { Color::Red } else { Color::Green };
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("{}: {}/{} free", occ.category, occ.available, occ.total),
            Style::default().fg(color),
        ));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Parked: {}", app.open_tickets.len()),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn panel_block(app: &App, panel: Panel) -> Block<'static> {
    let border = if app.panel == panel { Color::Yellow } else { Color::White };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(format!(" {} ", panel.title()))
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_spots(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.spots.iter().map(|spot| {
        let (status, color) = if spot.available {
            ("free", Color::Green)
        } else {
            ("taken", Color::Red)
        };
        Row::new(vec![
            Cell::from(spot.number.to_string()),
            Cell::from(spot.category.as_str()),
            Cell::from(status).style(Style::default().fg(color)),
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Length(6), Constraint::Length(6), Constraint::Length(8)],
    )
    .header(header_row(&["Spot", "Type", "Status"]))
    .block(panel_block(app, Panel::Spots))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.spots_state);
}

fn render_tickets(f: &mut Frame, area: Rect, app: &mut App) {
    let now = Utc::now();

    let rows = app.open_tickets.iter().map(|ticket| {
        let minutes = (now - ticket.entry_time).num_minutes().max(0);
        let category_color = match ticket.spot.category {
            VehicleCategory::Car => Color::Cyan,
            VehicleCategory::Bike => Color::Magenta,
        };
        Row::new(vec![
            Cell::from(ticket.id.to_string()),
            Cell::from(truncate(&ticket.vehicle_id, 14)),
            Cell::from(format!("{} {}", ticket.spot.number, ticket.spot.category))
                .style(Style::default().fg(category_color)),
            Cell::from(ticket.entry_time.format("%m-%d %H:%M").to_string()),
            Cell::from(format!("{}h{:02}", minutes / 60, minutes % 60)),
            Cell::from(if ticket.discount { "5%" } else { "" }),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Length(4),
        ],
    )
    .header(header_row(&["#", "Vehicle", "Spot", "In", "Stay", "Disc"]))
    .block(panel_block(app, Panel::Tickets))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.tickets_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(err) = &app.last_error {
        status_spans.push(Span::styled(format!(" {} ", err), Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Panel | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

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
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
