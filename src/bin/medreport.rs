//! CLI binary for medreport.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `analyze` runs one document through the pipeline and prints the JSON
//! envelope.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use medreport::{server, AnalysisConfig, Analyzer, Language, PipelineResult, UploadedDocument};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 3000
  medreport serve --port 3000

  # Analyse a local report and print the JSON envelope
  medreport analyze cbc.pdf

  # Arabic field values
  medreport analyze --language ar ultrasound.jpg

  # Upload through the HTTP service
  curl -F file=@cbc.pdf -F languagePreference=en \
       http://localhost:3000/api/analyze-and-summarize

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            Provider credential (required for analysis)
  MEDREPORT_MODEL           Chat model (default gpt-4o-mini)
  MEDREPORT_API_BASE        OpenAI-compatible base URL
  MEDREPORT_TIMEOUT_SECS    Provider deadline in seconds (default 300)
  MEDREPORT_MAX_TOKENS      Output token ceiling (default 1000)
  MEDREPORT_TEXT_BUDGET     Characters of report text sent (default 24000)
  MEDREPORT_MIN_TEXT_CHARS  Minimum usable text length (default 50)
  PDFIUM_LIB_PATH           Path to libpdfium (file or directory)
  RUST_LOG                  Log filter, overrides --verbose
"#;

/// Turn medical reports into structured, patient-friendly JSON.
#[derive(Parser, Debug)]
#[command(
    name = "medreport",
    version,
    about = "Turn medical reports (PDF or image) into structured, patient-friendly JSON",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDREPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true, env = "MEDREPORT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to bind.
        #[arg(long, env = "MEDREPORT_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on.
        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },

    /// Analyse one local file and print the JSON envelope.
    Analyze {
        /// PDF, image or plain-text report.
        file: PathBuf,

        /// Language of the field values: en or ar.
        #[arg(short, long, default_value = "en")]
        language: String,

        /// Override the media type guessed from the file extension.
        #[arg(long)]
        media_type: Option<String>,

        /// Print compact JSON instead of pretty-printed.
        #[arg(long)]
        compact: bool,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Chat model ID.
    #[arg(long, global = true, env = "MEDREPORT_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long, global = true, env = "MEDREPORT_API_BASE")]
    api_base: Option<String>,

    /// Provider credential.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Provider deadline in seconds.
    #[arg(long, global = true, env = "MEDREPORT_TIMEOUT_SECS")]
    timeout: Option<u64>,

    /// Max output tokens.
    #[arg(long, global = true, env = "MEDREPORT_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Characters of extracted text embedded in the prompt.
    #[arg(long, global = true, env = "MEDREPORT_TEXT_BUDGET")]
    text_budget: Option<usize>,

    /// Minimum trimmed text length for text-mode.
    #[arg(long, global = true, env = "MEDREPORT_MIN_TEXT_CHARS")]
    min_text_chars: Option<usize>,

    /// Path to libpdfium (file or directory).
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.pipeline).context("Invalid configuration")?;

    match cli.command {
        Command::Serve { host, port } => {
            let analyzer = Arc::new(Analyzer::from_config(config));
            if !analyzer.has_provider() {
                tracing::warn!("OPENAI_API_KEY is not set; analysis requests will fail");
            }
            server::serve(analyzer, SocketAddr::new(host, port))
                .await
                .context("HTTP server failed")?;
        }
        Command::Analyze {
            file,
            language,
            media_type,
            compact,
        } => {
            let mut document = UploadedDocument::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if let Some(mt) = media_type {
                document = UploadedDocument::new(
                    document.bytes().to_vec(),
                    mt,
                    document.filename().map(str::to_string),
                );
            }
            let language = Language::from_preference(Some(language.as_str()));
            let analyzer = Analyzer::from_config(config);

            let spinner = (!cli.quiet).then(|| analysis_spinner(&file));
            let result = analyzer.run(document, language).await;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            let envelope = result.envelope();
            let json = if compact {
                serde_json::to_string(&envelope)
            } else {
                serde_json::to_string_pretty(&envelope)
            }
            .context("Failed to serialise result")?;
            println!("{json}");

            match result {
                PipelineResult::Success(s) => {
                    if !cli.quiet {
                        let parsed = if s.fields.is_some() {
                            green("✔ fields parsed")
                        } else {
                            dim("raw reply (not JSON)")
                        };
                        eprintln!("{}  {:?} mode  {}", parsed, s.mode, dim(&s.language.to_string()));
                    }
                }
                PipelineResult::Failure(f) => {
                    eprintln!("{} {}", red("✘"), f.details);
                    bail!("analysis failed at {} stage", f.stage);
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(args: &PipelineArgs) -> Result<AnalysisConfig> {
    let mut b = AnalysisConfig::builder();
    if let Some(ref m) = args.model {
        b = b.model(m);
    }
    if let Some(ref base) = args.api_base {
        b = b.api_base(base);
    }
    if let Some(key) = args.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        b = b.api_key(key);
    }
    if let Some(secs) = args.timeout {
        b = b.timeout_secs(secs);
    }
    if let Some(n) = args.max_tokens {
        b = b.max_tokens(n);
    }
    if let Some(n) = args.text_budget {
        b = b.text_budget_chars(n);
    }
    if let Some(n) = args.min_text_chars {
        b = b.min_usable_chars(n);
    }
    if let Some(ref path) = args.pdfium_lib {
        b = b.pdfium_library(path);
    }
    Ok(b.build()?)
}

fn analysis_spinner(file: &std::path::Path) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Analysing");
    bar.set_message(
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
