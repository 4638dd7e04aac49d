use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use anstream::{ColorChoice, eprintln};
use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::check::CheckArgs;
use crate::lock::LockArgs;
use crate::logging::LockstepFormat;

mod check;
mod lock;
mod logging;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Prefix log lines with the spans they were emitted in.
    #[arg(long, global = true)]
    show_spans: bool,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Resolve requirements against an index snapshot and write, or extend, a lock file.
    Lock(LockArgs),
    /// Check whether a lock file was produced for the given requirements.
    Check(CheckArgs),
}

#[instrument(skip_all)] // Anchor span to check for overhead
async fn run(command: Command) -> Result<()> {
    match command {
        Command::Lock(args) => lock::lock(args).await?,
        Command::Check(args) => check::check(&args)?,
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Show `INFO` messages from the `lockstep` crates, but allow `RUST_LOG` to override.
    let default_directive = match Directive::from_str("lockstep=info") {
        Ok(directive) => directive,
        Err(err) => {
            eprintln!("{}: {err}", "Invalid default log directive".red().bold());
            return ExitCode::FAILURE;
        }
    };
    let filter = match EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env()
    {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("{}: {err}", "Invalid `RUST_LOG` directives".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Never | ColorChoice::Auto => false,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(LockstepFormat::default().with_spans(cli.show_spans))
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_filter(filter),
        )
        .init();

    let start = Instant::now();
    let result = run(cli.command).await;
    debug!("Took {}ms", start.elapsed().as_millis());
    if let Err(err) = result {
        eprintln!("{}", "lockstep-dev failed".red().bold());
        for err in err.chain() {
            eprintln!("  {}: {}", "Caused by".red().bold(), err);
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
