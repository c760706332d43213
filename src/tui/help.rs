use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key_line("tab", 9, "Switch tabs"),
        key_line("?", 11, "Show this help"),
        key_line("Enter", 7, "Dismiss message"),
        Line::from(""),
        Line::from("Orders tab:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Navigate"),
        ]),
        key_line("←/→", 9, "Choose service"),
        key_line("[/]", 9, "Choose country"),
        key_line("n", 11, "Create order"),
        key_line("r", 11, "Refresh balance and statuses"),
        key_line("a", 11, "Request SMS again (completed orders)"),
        key_line("f", 11, "Finish order (completed orders)"),
        key_line("c", 11, "Cancel order (waiting orders)"),
        key_line("d", 11, "Remove order"),
        key_line("y", 11, "Copy SMS code (or number) to clipboard"),
        key_line("e", 11, "Export orders as JSON"),
        key_line("v", 11, "Export orders as CSV"),
        Line::from(""),
        Line::from("History tab:"),
        key_line("r", 11, "Reload history"),
        Line::from(""),
        Line::from("Orders awaiting an SMS marked ● are checked every few seconds;"),
        Line::from("all rows are resynced on the auto-refresh interval."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
