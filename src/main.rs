use clap::Parser;
use logtail::config::{TailConfig, DEFAULT_CONFIG_FILE};
use logtail::error::FollowError;
use logtail::filter::{FilterSink, LineFilter};
use logtail::follower::{MissingPolicy, PartialLinePolicy, TruncationPolicy};
use logtail::output::{OutputFormat, TerminalSink};
use logtail::session;
use logtail::signals::shutdown_signal;
use logtail::sink::{ChannelSink, Sink, StopReason};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Monitor a log file continuously, like `tail -f`: print the last lines,
/// then every line appended after them, restarting when the file is
/// truncated or rotated.
#[derive(Parser, Debug)]
#[command(name = "logtail", version, about)]
pub struct Cli {
    /// Path to the log file to monitor
    filename: PathBuf,

    /// Number of initial lines to display, 0 to skip (default: 10)
    #[arg(short = 'n', long)]
    lines: Option<usize>,

    /// Seconds to sleep between checks (default: 1.0)
    #[arg(short = 's', long = "sleep-interval", value_name = "SECONDS")]
    sleep_interval: Option<f64>,

    /// Config file path (default: logtail.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Only print lines matching this pattern
    #[arg(short, long, value_name = "PATTERN")]
    grep: Option<String>,

    /// Match --grep case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Treat --grep as a literal string
    #[arg(short = 'F', long)]
    fixed_strings: bool,

    /// After truncation, follow only new content instead of replaying the file
    #[arg(long)]
    no_replay: bool,

    /// Print an unterminated last line when stopping
    #[arg(long)]
    flush_partial: bool,

    /// Stop with an error if the file is deleted instead of waiting for it
    #[arg(long)]
    fail_on_missing: bool,

    /// Extra logging (poll cycles, truncation handling)
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the start/stop banners
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Overlay command-line flags on file configuration.
    fn apply_to(&self, config: &mut TailConfig) {
        if let Some(lines) = self.lines {
            config.follow.lines = lines;
        }
        if let Some(secs) = self.sleep_interval {
            config.follow.sleep_interval_secs = secs;
        }
        if self.no_replay {
            config.follow.on_truncate = TruncationPolicy::SkipToEnd;
        }
        if self.flush_partial {
            config.follow.partial_lines = PartialLinePolicy::FlushOnStop;
        }
        if self.fail_on_missing {
            config.follow.on_missing = MissingPolicy::Fail;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.grep.is_some() {
            config.output.grep = self.grep.clone();
        }
        if self.case_sensitive {
            config.output.case_sensitive = true;
        }
        if self.fixed_strings {
            config.output.fixed_strings = true;
        }
        if self.quiet {
            config.output.banners = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    match run(cli).await {
        Ok(StopReason::Cancelled) => ExitCode::SUCCESS,
        Ok(StopReason::Failed) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<StopReason, Box<dyn std::error::Error>> {
    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let mut config = TailConfig::load(&config_path, required)?;
    cli.apply_to(&mut config);
    let options = config.follow_options()?;

    let filter = config
        .output
        .grep
        .as_deref()
        .map(|p| LineFilter::new(p, config.output.case_sensitive, config.output.fixed_strings))
        .transpose()?;

    let name = cli.filename.display().to_string();
    let mut terminal = TerminalSink::stdio(name.as_str(), config.output.format)
        .with_banners(config.output.banners)
        .with_replay(options.on_truncate == TruncationPolicy::Replay);

    let (tx, rx) = mpsc::channel(config.follow.channel_capacity.max(1));
    let channel = ChannelSink::new(tx);
    let started = match filter {
        Some(filter) => session::start(&cli.filename, options, FilterSink::new(channel, filter)),
        None => session::start(&cli.filename, options, channel),
    };
    let handle = match started {
        Ok(handle) => handle,
        Err(e @ FollowError::NotFound { .. }) => {
            terminal.on_error(e.kind(), &e.to_string());
            return Ok(StopReason::Failed);
        }
        Err(e) => return Err(e.into()),
    };
    terminal.started();

    let mut events = ReceiverStream::new(rx);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut cancelled = false;

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                event.dispatch(&mut terminal);
                if terminal.is_broken() && !cancelled {
                    handle.cancel();
                    cancelled = true;
                }
            }
            _ = &mut shutdown, if !cancelled => {
                handle.cancel();
                cancelled = true;
            }
        }
    }

    let reason = tokio::task::spawn_blocking(move || handle.join())
        .await
        .unwrap_or(StopReason::Failed);
    tracing::debug!(?reason, "session ended");
    Ok(reason)
}
