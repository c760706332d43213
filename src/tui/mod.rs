mod export;
mod help;
mod state;

use crate::api::{HttpBackend, OrderBackend};
use crate::cli::{build_config, Cli};
use crate::model::{DashboardEvent, NoticeKind, OrderStatus};
use crate::orchestrator::{self, UiCommand};
use crate::render::{render_row, RowAction};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Terminal,
};
use state::{UiState, TAB_HELP, TAB_HISTORY, TAB_ORDERS};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let backend: Arc<dyn OrderBackend> = Arc::new(HttpBackend::new(&cfg)?);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<DashboardEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_service = cfg.default_service.clone();
    let ui_country = cfg.default_country.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_service, ui_country, event_rx, cmd_tx));

    let res = orchestrator::run_controller(cfg, backend, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    service: String,
    country: String,
    mut event_rx: UnboundedReceiver<DashboardEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; the controller talks to it through events.
    let mut state = UiState {
        service,
        country,
        ..Default::default()
    };
    request_quote(&state, &cmd_tx);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    // Controller is gone; nothing left to drive.
                    disable_raw_mode().ok();
                    execute!(io::stdout(), LeaveAlternateScreen).ok();
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if (k.modifiers, k.code) == (KeyModifiers::CONTROL, KeyCode::Char('c')) {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
                // An open notice swallows input until it is acknowledged.
                if state.current_notice().is_some() {
                    if matches!(k.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                        state.dismiss_notice();
                    }
                    continue;
                }
                if !handle_key(&mut state, &cmd_tx, k.code) {
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn request_quote(state: &UiState, cmd_tx: &UnboundedSender<UiCommand>) {
    let _ = cmd_tx.send(UiCommand::Quote {
        service: state.service.clone(),
        country: state.country.clone(),
    });
}

/// Map a key press to state changes and controller commands. Returns `false` to quit.
fn handle_key(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') => {
            let _ = cmd_tx.send(UiCommand::Quit);
            return false;
        }
        KeyCode::Tab => {
            state.tab = (state.tab + 1) % 3;
            if state.tab == TAB_HISTORY && !state.history_loaded {
                state.info = "Loading history…".into();
                let _ = cmd_tx.send(UiCommand::LoadHistory);
            }
        }
        KeyCode::Char('?') => state.tab = TAB_HELP,
        KeyCode::Up | KeyCode::Char('k') => state.move_selection(false),
        KeyCode::Down | KeyCode::Char('j') => state.move_selection(true),
        KeyCode::Char('r') => {
            if state.tab == TAB_HISTORY {
                state.info = "Loading history…".into();
                let _ = cmd_tx.send(UiCommand::LoadHistory);
            } else {
                state.info = "Refreshing…".into();
                let _ = cmd_tx.send(UiCommand::Refresh);
            }
        }
        _ if state.tab != TAB_ORDERS => {}
        KeyCode::Left | KeyCode::Right => {
            if state.cycle_service(code == KeyCode::Right) {
                request_quote(state, cmd_tx);
            }
        }
        KeyCode::Char('[') | KeyCode::Char(']') => {
            if state.cycle_country(code == KeyCode::Char(']')) {
                request_quote(state, cmd_tx);
            }
        }
        KeyCode::Char('n') => {
            if state.view.create_in_flight {
                state.info = "Order creation already in progress".into();
            } else {
                let _ = cmd_tx.send(UiCommand::Create {
                    service: state.service.clone(),
                    country: state.country.clone(),
                });
            }
        }
        KeyCode::Char('a') => row_action(state, cmd_tx, RowAction::RequestAgain),
        KeyCode::Char('c') => row_action(state, cmd_tx, RowAction::Cancel),
        KeyCode::Char('d') => row_action(state, cmd_tx, RowAction::Remove),
        KeyCode::Char('f') => row_action(state, cmd_tx, RowAction::Finish),
        KeyCode::Char('y') => {
            let Some(row) = state.selected_row() else {
                state.info = "No order selected".into();
                return true;
            };
            let (what, text) = if row.completed && row.sms != crate::render::EMPTY_PLACEHOLDER {
                ("SMS", row.sms.clone())
            } else {
                ("number", row.number.clone())
            };
            state.info = match export::copy_to_clipboard(&text) {
                Ok(()) => format!("✓ Copied {what} to clipboard: {text}"),
                Err(e) => format!("Clipboard copy failed: {e:#}"),
            };
        }
        KeyCode::Char('e') | KeyCode::Char('v') => {
            let (kind, res) = if code == KeyCode::Char('e') {
                ("JSON", export::export_orders_json(&state.view.rows))
            } else {
                ("CSV", export::export_orders_csv(&state.view.rows))
            };
            state.info = match res {
                Ok(p) => format!("Exported {kind}: {}", p.display()),
                Err(e) => format!("{kind} export failed: {e:#}"),
            };
        }
        _ => {}
    }
    true
}

/// Send an action for the selected row, bound to that row's own order id.
fn row_action(state: &mut UiState, cmd_tx: &UnboundedSender<UiCommand>, action: RowAction) {
    let Some(row) = state.selected_row() else {
        state.info = "No order selected".into();
        return;
    };
    if !row.allows(action) {
        state.info = format!("{} is not available for order {}", action.label(), row.order_id);
        return;
    }
    let order_id = row.order_id.clone();
    state.info = format!("{} order {order_id}…", action.label());
    let _ = cmd_tx.send(UiCommand::Order { action, order_id });
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Orders"),
        Line::from("History"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("sms-orders"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_ORDERS => draw_orders(chunks[1], f, state),
        TAB_HISTORY => draw_history(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    if let Some(notice) = state.current_notice() {
        draw_notice(area, f, notice.kind, &notice.text);
    }
}

fn action_keys(actions: &[RowAction]) -> String {
    actions
        .iter()
        .map(|a| match a {
            RowAction::RequestAgain => "[a] again",
            RowAction::Cancel => "[c] cancel",
            RowAction::Remove => "[d] remove",
            RowAction::Finish => "[f] finish",
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn status_color(status: &OrderStatus) -> Color {
    match status {
        OrderStatus::Completed => Color::Green,
        OrderStatus::Cancelled | OrderStatus::Timeout | OrderStatus::Deleted => Color::Red,
        OrderStatus::Finished => Color::Gray,
        OrderStatus::Waiting | OrderStatus::Other(_) => Color::Yellow,
    }
}

fn draw_orders(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(4), // Balance + create form
                Constraint::Min(0),    // Orders table
                Constraint::Length(3), // Status line
            ]
            .as_ref(),
        )
        .split(area);

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            state.view.balance.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        state.create_form_line(),
    ])
    .block(Block::default().borders(Borders::ALL).title("New order"));
    f.render_widget(header, main[0]);

    let title = if state.view.polling.is_empty() {
        format!("Orders ({})", state.view.rows.len())
    } else {
        format!(
            "Orders ({}) · polling {}",
            state.view.rows.len(),
            state.view.polling.len()
        )
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if state.view.rows.is_empty() {
        let p = Paragraph::new("No orders yet. Press n to create one.").block(block);
        f.render_widget(p, main[1]);
    } else {
        let rows: Vec<Row> = state
            .view
            .rows
            .iter()
            .map(|r| {
                let marker = if state.is_polling(&r.order_id) { "●" } else { " " };
                let sms_style = if r.completed {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                Row::new(vec![
                    Cell::from(Span::styled(marker, Style::default().fg(Color::Yellow))),
                    Cell::from(r.order_id.clone()),
                    Cell::from(r.number.clone()),
                    Cell::from(r.service.clone()),
                    Cell::from(r.country.clone()),
                    Cell::from(Span::styled(
                        r.status.clone(),
                        Style::default().fg(status_color(&OrderStatus::from(r.status.as_str()))),
                    )),
                    Cell::from(Span::styled(r.sms.clone(), sms_style)),
                    Cell::from(action_keys(&r.actions)),
                ])
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(1),
                Constraint::Length(10),
                Constraint::Length(16),
                Constraint::Length(14),
                Constraint::Length(12),
                Constraint::Length(11),
                Constraint::Min(10),
                Constraint::Length(30),
            ],
        )
        .header(
            Row::new(vec!["", "ID", "Number", "Service", "Country", "Status", "SMS", "Actions"])
                .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        )
        .row_highlight_style(Style::default().bg(Color::DarkGray))
        .block(block);
        let mut ts = TableState::default().with_selected(Some(state.selected));
        f.render_stateful_widget(table, main[1], &mut ts);
    }

    let status = Paragraph::new(Line::from(vec![
        Span::raw(state.info.clone()),
        Span::styled(
            "   n new · r refresh · a/c/d/f act · y copy · ? help",
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, main[2]);
}

fn draw_history(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("History ({})", state.history.len()));

    if state.history.is_empty() {
        let msg = if state.history_loaded {
            "No past orders."
        } else {
            "History not loaded yet. Press r to load."
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    }

    let rows: Vec<Row> = state
        .history
        .iter()
        .map(|o| {
            let r = render_row(o);
            let created = o.created_at.clone().unwrap_or_default();
            Row::new(vec![
                Cell::from(r.order_id),
                Cell::from(r.number),
                Cell::from(r.service),
                Cell::from(r.country),
                Cell::from(Span::styled(
                    r.status.clone(),
                    Style::default().fg(status_color(&o.status)),
                )),
                Cell::from(r.sms),
                Cell::from(created),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(11),
            Constraint::Min(10),
            Constraint::Length(20),
        ],
    )
    .header(
        Row::new(vec!["ID", "Number", "Service", "Country", "Status", "SMS", "Created"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray))
    .block(block);
    let mut ts = TableState::default().with_selected(Some(state.history_selected));
    f.render_stateful_widget(table, area, &mut ts);
}

fn draw_notice(area: Rect, f: &mut ratatui::Frame, kind: NoticeKind, text: &str) {
    let [row] = Layout::vertical([Constraint::Length(7)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Percentage(60)])
        .flex(Flex::Center)
        .areas(row);

    let (title, color) = match kind {
        NoticeKind::Success => ("Success", Color::Green),
        NoticeKind::Failure => ("Error", Color::Red),
    };
    let p = Paragraph::new(vec![
        Line::from(text.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title),
    );
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}
