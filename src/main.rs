mod api;
mod cli;
mod error;
mod logging;
mod model;
mod orchestrator;
mod registry;
mod render;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use logging::LogTarget;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let target = match (&args.log_file, args.is_interactive()) {
        (Some(path), _) => LogTarget::File(path),
        (None, true) => LogTarget::Discard,
        (None, false) => LogTarget::Stderr,
    };
    logging::init_logging(target, args.verbose)?;

    let is_non_tui = !args.is_interactive();
    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success for one-shot modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with error");
            Err(e)
        }
    }
}
