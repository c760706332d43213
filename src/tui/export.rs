use crate::render::RowView;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

const CSV_HEADER: &str = "id,number,service,country,status,sms";

fn export_name(now: OffsetDateTime, ext: &str) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("sms-orders-{stamp}.{ext}")
}

fn export_path(ext: &str) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(export_name(OffsetDateTime::now_utc(), ext)))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render the visible order rows as CSV.
pub fn orders_csv(rows: &[RowView]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let fields = [
            &row.order_id,
            &row.number,
            &row.service,
            &row.country,
            &row.status,
            &row.sms,
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Export the current rows as JSON into the working directory.
/// Returns the absolute path of the exported file.
pub fn export_orders_json(rows: &[RowView]) -> Result<PathBuf> {
    let path = export_path("json")?;
    let body = serde_json::to_string_pretty(rows).context("serialize orders")?;
    write_file(&path, &body)?;
    Ok(path)
}

/// Export the current rows as CSV into the working directory.
pub fn export_orders_csv(rows: &[RowView]) -> Result<PathBuf> {
    let path = export_path("csv")?;
    write_file(&path, &orders_csv(rows))?;
    Ok(path)
}

/// Initialize the clipboard manager thread if not already initialized.
/// Each copy keeps its clipboard instance alive for a while so clipboard
/// managers on Linux get a chance to read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
