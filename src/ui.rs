use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
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
use rusqlite::Connection;
use std::io;

use whose_round::{
    get_rounds_for_group, insert_round, list_groups, Error, Group, Member, NewRound,
    RotationResolver, Round,
};

const MAX_GROUPS: usize = 1000;

pub struct App {
    conn: Connection,
    pub groups: Vec<Group>,
    pub state: TableState,
    pub rounds: Vec<Round>,
    pub next_payer: Option<Member>,
    pub status: Option<String>,
}

impl App {
    pub fn new(conn: Connection) -> Result<Self> {
        let mut app = Self {
            conn,
            groups: Vec::new(),
            state: TableState::default(),
            rounds: Vec::new(),
            next_payer: None,
            status: None,
        };
        app.reload()?;
        Ok(app)
    }

    /// Re-read groups, keeping the selection where possible
    pub fn reload(&mut self) -> whose_round::Result<()> {
        self.groups = list_groups(&self.conn, 0, MAX_GROUPS)?;

        let selected = match self.state.selected() {
            _ if self.groups.is_empty() => None,
            Some(i) => Some(i.min(self.groups.len() - 1)),
            None => Some(0),
        };
        self.state.select(selected);

        self.refresh_selected()
    }

    pub fn selected_group(&self) -> Option<&Group> {
        self.state.selected().and_then(|i| self.groups.get(i))
    }

    fn refresh_selected(&mut self) -> whose_round::Result<()> {
        let group_id = match self.selected_group() {
            Some(group) => group.id,
            None => {
                self.rounds.clear();
                self.next_payer = None;
                return Ok(());
            }
        };

        self.rounds = get_rounds_for_group(&self.conn, group_id)?;
        self.next_payer = match RotationResolver::resolve(&self.conn, group_id) {
            Ok(member) => Some(member),
            Err(Error::NoMembers) => None,
            Err(e) => return Err(e),
        };
        Ok(())
    }

    /// Record a round paid by whoever is up next
    pub fn record_round(&mut self) -> whose_round::Result<()> {
        let (group_id, payer) = match (self.selected_group(), &self.next_payer) {
            (Some(group), Some(payer)) => (group.id, payer.clone()),
            (Some(_), None) => {
                self.status = Some("Add members before recording a round".to_string());
                return Ok(());
            }
            (None, _) => return Ok(()),
        };

        let round = NewRound::new(group_id, payer.user.id, 0, Some("Round paid".to_string()));
        insert_round(&self.conn, &round)?;
        self.status = Some(format!("🍺 {} paid", payer.username()));

        self.refresh_selected()
    }

    pub fn next(&mut self) -> whose_round::Result<()> {
        let len = self.groups.len();
        if len == 0 {
            return Ok(());
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
        self.refresh_selected()
    }

    pub fn previous(&mut self) -> whose_round::Result<()> {
        let len = self.groups.len();
        if len == 0 {
            return Ok(());
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
        self.refresh_selected()
    }

    fn payer_name(&self, user_id: i64) -> String {
        self.selected_group()
            .and_then(|g| g.members.iter().find(|m| m.user.id == user_id))
            .map(|m| m.username().to_string())
            .unwrap_or_else(|| format!("#{}", user_id))
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

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            let result = match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Char('p') => app.record_round(),
                KeyCode::Char('r') => app.reload(),
                _ => Ok(()),
            };

            if let Err(e) = result {
                app.status = Some(format!("Error: {}", e));
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    render_groups(f, content[0], app);

    let detail = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(content[1]);

    render_members(f, detail[0], app);
    render_rounds(f, detail[1], app);

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "Whose Round 🍺",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Groups: {}", app.groups.len()), Style::default().fg(Color::White)),
    ];

    if let Some(payer) = &app.next_payer {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("Next up: {}", payer.username()),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_groups(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.groups.iter().map(|group| {
        Row::new(vec![
            Cell::from(format!("#{}", group.id)),
            Cell::from(truncate(&group.name, 24)),
            Cell::from(group.member_count().to_string()),
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Length(6), Constraint::Min(10), Constraint::Length(8)],
    )
    .header(header_row(&["Id", "Group", "Members"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Groups "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_members(f: &mut Frame, area: Rect, app: &App) {
    let next_id = app.next_payer.as_ref().map(|m| m.user.id);
    let members: &[Member] = app.selected_group().map(|g| g.members.as_slice()).unwrap_or(&[]);

    let rows = members.iter().map(|member| {
        let is_next = Some(member.user.id) == next_id;
        let style = if is_next {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        Row::new(vec![
            Cell::from((member.position + 1).to_string()),
            Cell::from(truncate(member.username(), 20)),
            Cell::from(truncate(&member.user.email, 28)),
            Cell::from(if is_next { "🍺 next" } else { "" }),
        ])
        .style(style)
    });

    let title = if members.is_empty() && app.selected_group().is_some() {
        " Rotation (no members) "
    } else {
        " Rotation "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(22),
            Constraint::Min(10),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["#", "Member", "Email", ""]))
    .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn render_rounds(f: &mut Frame, area: Rect, app: &App) {
    let rows = app.rounds.iter().map(|round| {
        Row::new(vec![
            Cell::from(round.date.format("%Y-%m-%d %H:%M").to_string()),
            Cell::from(truncate(&app.payer_name(round.paid_by_id), 20)),
            Cell::from(format!("{:.2}", round.amount as f64 / 100.0)),
            Cell::from(truncate(round.notes.as_deref().unwrap_or(""), 30)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(17),
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["Date", "Paid by", "Amount", "Notes"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Rounds ({}) ", app.rounds.len())),
    );

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(message) = &app.status {
        status_spans.push(Span::styled(format!(" {} ", message), Style::default().fg(Color::Green)));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Group | "));
    status_spans.push(Span::styled("p", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Paid | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reload | "));
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
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whose_round::{add_member, insert_group, insert_user, setup_database, NewGroup, NewUser};

    fn seeded() -> (Connection, Vec<i64>) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let ids: Vec<i64> = ["ana", "ben"]
            .iter()
            .map(|name| {
                insert_user(&conn, &NewUser::new(&format!("{}@example.com", name), name, "pw"), "hash")
                    .unwrap()
                    .id
            })
            .collect();

        let full = insert_group(&conn, &NewGroup::new("Friday", ids[0])).unwrap();
        for id in &ids {
            add_member(&conn, full.id, *id).unwrap();
        }
        insert_group(&conn, &NewGroup::new("Empty", ids[0])).unwrap();

        (conn, ids)
    }

    #[test]
    fn test_paying_advances_rotation() {
        let (conn, ids) = seeded();
        let mut app = App::new(conn).unwrap();

        assert_eq!(app.selected_group().unwrap().name, "Friday");
        assert_eq!(app.next_payer.as_ref().unwrap().user.id, ids[0]);

        app.record_round().unwrap();
        assert_eq!(app.rounds.len(), 1);
        assert_eq!(app.rounds[0].notes.as_deref(), Some("Round paid"));
        assert_eq!(app.next_payer.as_ref().unwrap().user.id, ids[1]);

        app.record_round().unwrap();
        assert_eq!(app.next_payer.as_ref().unwrap().user.id, ids[0]);
    }

    #[test]
    fn test_empty_group_does_not_record() {
        let (conn, _) = seeded();
        let mut app = App::new(conn).unwrap();

        app.next().unwrap();
        assert_eq!(app.selected_group().unwrap().name, "Empty");
        assert!(app.next_payer.is_none());

        app.record_round().unwrap();
        assert!(app.rounds.is_empty());
        assert!(app.status.is_some());

        // wraps back to the first group
        app.next().unwrap();
        assert_eq!(app.selected_group().unwrap().name, "Friday");
        app.previous().unwrap();
        assert_eq!(app.selected_group().unwrap().name, "Empty");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long group name", 10), "a very ...");
    }
}
