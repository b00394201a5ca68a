use clap::{Parser, ValueEnum};
use log_tail::{Config, Line, tail_file};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Print lines appended to files, following them across rotation.
#[derive(Debug, Parser)]
#[command(name = "log-tail", version, about, long_about = None)]
struct Args {
    /// Start location: 0 tails from the end, N starts at byte N, -N at byte N-1
    #[arg(short = 'n', value_name = "OFFSET", default_value_t = 0, allow_negative_numbers = true)]
    location: i64,

    /// Wait for additional data to be appended to the file
    #[arg(short = 'f')]
    follow: bool,

    /// Follow, and track file rename/rotation
    #[arg(short = 'F')]
    reopen: bool,

    /// Use polling instead of OS change notification
    #[arg(short = 'p')]
    poll: bool,

    /// Split lines longer than this many bytes (0 disables)
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    max_line_size: usize,

    /// Polling interval in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 250)]
    poll_interval_ms: u64,

    /// Logging level; overrides LOG_TAIL_LOG
    #[arg(long, value_enum, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Files to tail
    files: Vec<PathBuf>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Args {
    fn config(&self) -> Config {
        Config {
            location: self.location,
            follow: self.follow || self.reopen,
            reopen: self.reopen,
            must_exist: false,
            poll: self.poll,
            max_line_size: self.max_line_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

fn init_tracing(level: Option<LogLevel>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_env("LOG_TAIL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Writes the line as read; the file's bytes need not be UTF-8.
fn write_line(line: &Line) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")
}

async fn tail_one(path: PathBuf, config: Config) -> anyhow::Result<()> {
    let mut tail = tail_file(&path, config).await?;
    while let Some(line) = tail.next().await {
        write_line(&line)?;
    }
    tail.wait().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_level);

    if args.files.is_empty() {
        eprintln!("need one or more files as arguments");
        process::exit(1);
    }

    let config = args.config();
    let mut tails = JoinSet::new();
    for path in args.files {
        let config = config.clone();
        tails.spawn(async move {
            let result = tail_one(path.clone(), config).await;
            (path, result)
        });
    }

    // A failing file does not stop the others.
    while let Some(joined) = tails.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((path, Err(e))) => eprintln!("{}: {}", path.display(), e),
            Err(e) => eprintln!("tail task failed: {}", e),
        }
    }
}
