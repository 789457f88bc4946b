use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use textpulse::config::{self, Config, EngineConfig};
use textpulse::stats::{self, TextStats};
use textpulse::{Engine, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "textpulse")]
#[command(author, version, about = "Incremental text statistics", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print statistics for a file (or stdin)
    Analyze {
        /// File to analyze; reads stdin when omitted
        file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Reading speed in words per minute
        #[arg(long)]
        wpm: Option<u32>,
    },

    /// Stream stdin through the incremental engine, printing each update
    Watch {
        /// Quiet period before recomputing (milliseconds)
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Reading speed in words per minute
        #[arg(long)]
        wpm: Option<u32>,

        /// Compute inline instead of on a worker thread
        #[arg(long)]
        no_worker: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Configure settings
    Config {
        /// Set the reading speed (words per minute)
        #[arg(long)]
        wpm: Option<u32>,

        /// Set the debounce interval (milliseconds)
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Enable/disable the worker thread (on, off)
        #[arg(long)]
        worker: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// One line of `watch` output.
#[derive(Serialize)]
struct WatchEvent<'a> {
    event: &'a str,
    stats: TextStats,
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("textpulse=debug")
    } else {
        EnvFilter::new(format!("textpulse={}", level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load settings without creating a config file as a side effect.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match Config::config_path() {
            Ok(p) => p,
            Err(_) => return Ok(Config::default()),
        },
    };

    if path.exists() {
        Config::load_from(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Analyze { file, format, wpm } => {
            let wpm = wpm.unwrap_or(config.engine.words_per_minute);
            analyze(file.as_deref(), format, wpm)?;
        }

        Commands::Watch {
            debounce_ms,
            wpm,
            no_worker,
            format,
        } => {
            let mut engine_config = config.engine.clone();
            if let Some(ms) = debounce_ms {
                engine_config.debounce_ms = ms;
            }
            if let Some(wpm) = wpm {
                engine_config.words_per_minute = wpm;
            }
            if no_worker {
                engine_config.use_worker = false;
            }
            watch(engine_config, format).await?;
        }

        Commands::Config {
            wpm,
            debounce_ms,
            worker,
            show,
        } => {
            if show {
                config::show(cli.config.as_deref())?;
            } else {
                config::update(cli.config.as_deref(), wpm, debounce_ms, worker)?;
            }
        }
    }

    Ok(())
}

fn analyze(file: Option<&Path>, format: OutputFormat, wpm: u32) -> anyhow::Result<()> {
    let bytes = match file {
        Some(path) => {
            info!("Analyzing: {}", path.display());
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let result = stats::compute_bytes(&bytes, wpm);

    match format {
        OutputFormat::Text => print!("{}", render_text(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

fn render_text(stats: &TextStats) -> String {
    format!(
        "characters:              {}\n\
         characters (no spaces):  {}\n\
         words:                   {}\n\
         sentences:               {}\n\
         paragraphs:              {}\n\
         lines:                   {}\n\
         reading time:            {} min\n",
        stats.characters,
        stats.characters_no_spaces,
        stats.words,
        stats.sentences,
        stats.paragraphs,
        stats.lines,
        stats.reading_time
    )
}

/// Text of the document so far; invalid UTF-8 counts as no text, as in
/// `analyze`.
fn document_text(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("")
}

fn print_event(event: &str, stats: TextStats, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!(
            "[{}] {} words, {} chars, {} sentences, {} paragraphs, {} lines, ~{} min",
            event,
            stats.words,
            stats.characters,
            stats.sentences,
            stats.paragraphs,
            stats.lines,
            stats.reading_time
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string(&WatchEvent { event, stats })?),
    }
    Ok(())
}

async fn watch(engine_config: EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::new(engine_config)?;
    info!("Watching stdin ({} backend)", engine.backend_kind());

    let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();
    let _subscription = engine.subscribe(move |snapshot| {
        let _ = tx.send(*snapshot);
    });

    // Bytes exactly as read, line terminators included, so the final stats
    // match `analyze` on the same input. A partial read interrupted by the
    // other select branch stays in the buffer and is continued next loop.
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut document: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            read = stdin.read_until(b'\n', &mut document) => {
                if read.context("Failed to read stdin")? == 0 {
                    break;
                }
                engine.feed(document_text(&document));
            },
            Some(snapshot) = rx.recv() => {
                if !snapshot.is_calculating {
                    print_event("update", snapshot.stats, format)?;
                }
            }
        }
    }

    // Input closed: measure whatever is still waiting on the debounce gate
    engine.flush();
    while engine.snapshot().is_calculating {
        match rx.recv().await {
            Some(snapshot) if !snapshot.is_calculating => {
                print_event("update", snapshot.stats, format)?;
            }
            Some(_) => {}
            None => break,
        }
    }

    debug!("Input closed after {} bytes", document.len());
    print_event("final", engine.snapshot().stats, format)?;
    engine.dispose();

    Ok(())
}
