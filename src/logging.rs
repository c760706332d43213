use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines go.
pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
    /// The dashboard owns the terminal, so without a log file nothing is written.
    Discard,
}

/// Initialize logging.
///
/// `RUST_LOG` takes precedence; otherwise the crate logs at info, or debug when
/// `verbose` is set.
pub fn init_logging(target: LogTarget<'_>, verbose: bool) -> Result<()> {
    let directive = if verbose {
        "sms_orders=debug"
    } else {
        "sms_orders=info"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))?;

    let registry = tracing_subscriber::registry().with(filter);
    match target {
        LogTarget::Stderr => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
        LogTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?
        }
        LogTarget::Discard => registry
            .with(fmt::layer().with_writer(std::io::sink))
            .try_init()?,
    }
    Ok(())
}
