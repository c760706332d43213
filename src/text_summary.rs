//! Text table builder for CLI output.

use crate::model::{Balance, Order};
use crate::render::{render_row, RowView};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

const HEADERS: [&str; 6] = ["ID", "Number", "Service", "Country", "Status", "SMS"];

fn cells(row: &RowView) -> [&str; 6] {
    [
        row.order_id.as_str(),
        row.number.as_str(),
        row.service.as_str(),
        row.country.as_str(),
        row.status.as_str(),
        row.sms.as_str(),
    ]
}

/// Build a text table from a balance line and an order list.
pub(crate) fn build_text_summary(balance: Option<&Balance>, orders: &[Order]) -> TextSummary {
    let mut lines = Vec::new();
    if let Some(balance) = balance {
        lines.push(balance.to_string());
    }
    if orders.is_empty() {
        lines.push("No orders".to_string());
        return TextSummary { lines };
    }

    let rows: Vec<RowView> = orders.iter().map(render_row).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(cells(row)) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let format_line = |cols: [&str; 6]| -> String {
        cols.iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    lines.push(format_line(HEADERS));
    for row in &rows {
        lines.push(format_line(cells(row)));
    }
    TextSummary { lines }
}
