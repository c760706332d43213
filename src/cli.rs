use crate::api::{HttpBackend, OrderBackend};
use crate::model::{Balance, DashboardConfig, Order};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sms-orders",
    version,
    about = "Rent SMS numbers and watch orders until the code arrives"
)]
pub struct Cli {
    /// Base URL of the order backend
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    pub base_url: String,

    /// How often an order awaiting an SMS is checked
    #[arg(long, default_value = "5s")]
    pub poll_interval: humantime::Duration,

    /// Stop checking an order after this long without an SMS
    #[arg(long, default_value = "5m")]
    pub poll_timeout: humantime::Duration,

    /// Interval of the full balance + status resync
    #[arg(long, default_value = "30s")]
    pub auto_refresh: humantime::Duration,

    /// Per-request timeout
    #[arg(long, default_value = "15s")]
    pub request_timeout: humantime::Duration,

    /// Service code preselected for new orders
    #[arg(long, default_value = "wa")]
    pub service: String,

    /// Country code preselected for new orders
    #[arg(long, default_value = "6")]
    pub country: String,

    /// Maximum price to pay for a number
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Print a JSON snapshot and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text snapshot and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Show closed orders instead of active ones (with --json or --text)
    #[arg(long)]
    pub history: bool,

    /// Write logs to this file (the dashboard otherwise discards them)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !self.json && !self.text
    }
}

/// Build a `DashboardConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> DashboardConfig {
    DashboardConfig {
        base_url: args.base_url.clone(),
        poll_interval: Duration::from(args.poll_interval),
        poll_timeout: Duration::from(args.poll_timeout),
        auto_refresh: Duration::from(args.auto_refresh),
        request_timeout: Duration::from(args.request_timeout),
        default_service: args.service.clone(),
        default_country: args.country.clone(),
        max_price: args.max_price,
        user_agent: format!("sms-orders/{}", env!("CARGO_PKG_VERSION")),
    }
}

fn validate(args: &Cli) -> Result<()> {
    if Duration::from(args.poll_interval).is_zero() {
        return Err(anyhow::anyhow!("--poll-interval must be greater than zero"));
    }
    if Duration::from(args.auto_refresh).is_zero() {
        return Err(anyhow::anyhow!("--auto-refresh must be greater than zero"));
    }
    if args.history && args.is_interactive() {
        return Err(anyhow::anyhow!(
            "--history can only be used with --json or --text. The dashboard has a History tab."
        ));
    }
    Ok(())
}

pub async fn run(args: Cli) -> Result<()> {
    validate(&args)?;

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_snapshot(args, false).await;
        }
    }

    let json = args.json;
    run_snapshot(args, json).await
}

#[derive(Debug, Serialize)]
struct Snapshot {
    balance: Option<String>,
    orders: Vec<Order>,
}

/// Fetch balance and orders once and print them.
async fn run_snapshot(args: Cli, json: bool) -> Result<()> {
    let cfg = build_config(&args);
    let backend = HttpBackend::new(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();

    let (balance, orders) = if args.history {
        (None, backend.history().await.context("loading order history")?)
    } else {
        let (balance, orders) = tokio::join!(backend.balance(), backend.list());
        let orders = orders.context("loading orders")?;
        let balance = match balance {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(error = %e, "loading balance failed");
                let _ = out_tx.send(OutputLine::Stderr(format!("Balance unavailable: {e}")));
                None
            }
        };
        (balance, orders)
    };

    if json {
        let out = serde_json::to_string_pretty(&Snapshot { balance, orders })?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let balance = match (args.history, balance) {
            (true, _) => None,
            (false, Some(b)) => Some(Balance::Amount(b)),
            (false, None) => Some(Balance::Unavailable),
        };
        let summary = crate::text_summary::build_text_summary(balance.as_ref(), &orders);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_cadence() {
        let args = Cli::parse_from(["sms-orders"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.poll_timeout, Duration::from_secs(300));
        assert_eq!(cfg.auto_refresh, Duration::from_secs(30));
        assert_eq!(cfg.default_service, "wa");
        assert!(cfg.user_agent.starts_with("sms-orders/"));
        assert!(args.is_interactive());
    }

    #[test]
    fn durations_parse_humantime() {
        let args = Cli::parse_from([
            "sms-orders",
            "--poll-interval",
            "2s",
            "--poll-timeout",
            "1m 30s",
            "--max-price",
            "3.5",
            "--text",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.poll_timeout, Duration::from_secs(90));
        assert_eq!(cfg.max_price, Some(3.5));
        assert!(!args.is_interactive());
    }

    #[test]
    fn rejects_zero_intervals_and_interactive_history() {
        let zero = Cli::parse_from(["sms-orders", "--poll-interval", "0s"]);
        assert!(validate(&zero).is_err());
        let history = Cli::parse_from(["sms-orders", "--history"]);
        assert!(validate(&history).is_err());
        let ok = Cli::parse_from(["sms-orders", "--history", "--json"]);
        assert!(validate(&ok).is_ok());
    }
}
