//! CLI binary for medbuddy.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, runs one analysis or starts the HTTP shell, and prints
//! results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use medbuddy::{
    AnalysisConfig, AnalysisDomain, AnalysisOutcome, Pipeline, PipelineProgressCallback,
    PipelineStage, ProgressCallback, ReportKind,
};
use std::io::{self, Write};
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
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar step per analysis stage, one log line per
/// finished stage. Rendering runs after the analysis has been reported, so
/// its lines go straight to stderr under their own header.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg}  ⏱ {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Above the bar while it runs, plain stderr once it is finished.
    fn emit(&self, line: String) {
        if self.bar.is_finished() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

/// Log line for a finished stage.
fn stage_done_line(stage: PipelineStage, elapsed_ms: u64) -> String {
    let secs = dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0));
    match stage {
        PipelineStage::Render => format!("{} report rendered  {}", green("✔"), secs),
        _ => format!("  {} {:<13} {}", green("✓"), stage, secs),
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, kind: ReportKind, stages: usize) {
        self.bar.set_length(stages as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting {kind} analysis…"))
        ));
    }

    fn on_stage_start(&self, stage: PipelineStage) {
        if stage == PipelineStage::Render {
            self.emit(format!("{} {}", cyan("◆"), bold("Rendering report…")));
        } else {
            self.bar.set_message(stage.to_string());
        }
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        self.emit(stage_done_line(stage, elapsed_ms));
        if stage != PipelineStage::Render {
            self.bar.inc(1);
        }
    }

    fn on_stage_error(&self, stage: PipelineStage, error: &str) {
        // Keep the log line on one terminal row.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.emit(format!("  {} {:<13} {}", red("✗"), stage, red(&msg)));
    }

    fn on_run_complete(&self, success: bool) {
        self.bar.finish_and_clear();
        if success {
            eprintln!("{} analysis complete", green("✔"));
        } else {
            eprintln!("{} analysis failed", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a cardiology report (prints the analysis)
  medbuddy analyze echo_report.pdf --domain heart

  # Analyse an MRI slice and save the PDF report
  medbuddy analyze mri.png --domain brain --report-dir reports/

  # Analyse a report published online
  medbuddy analyze https://example.org/report.pdf --domain heart

  # Machine-readable outcome
  medbuddy analyze scan.jpg --domain brain --json > outcome.json

  # HTTP shell
  medbuddy serve --bind 0.0.0.0:8501

SUPPORTED INPUTS:
  .pdf               medical report (text layer is analysed)
  .png .jpg .jpeg    scan (image is analysed)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Google Gemini API key
  GOOGLE_API_KEY        Accepted in place of GEMINI_API_KEY
  OPENAI_API_KEY        OpenAI API key (with --provider openai)
  ANTHROPIC_API_KEY     Anthropic API key (with --provider anthropic)
  MEDBUDDY_*            Every flag has a MEDBUDDY_ fallback (see --help)
  RUST_LOG              Overrides the log filter

  A .env file in the working directory is loaded at startup.
"#;

/// Analyse medical reports and scans with a generative-AI backend.
#[derive(Parser, Debug)]
#[command(
    name = "medbuddy",
    version,
    about = "Analyse medical reports (PDF) and scans (PNG/JPEG) with a generative-AI backend",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDBUDDY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MEDBUDDY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one report or scan.
    Analyze(AnalyzeArgs),

    /// Serve the pipeline over HTTP.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Local file path or HTTP/HTTPS URL (.pdf, .png, .jpg, .jpeg).
    input: String,

    /// Anatomical focus of the analysis.
    #[arg(short, long, env = "MEDBUDDY_DOMAIN", value_enum)]
    domain: DomainArg,

    /// Save the PDF report into this directory.
    #[arg(long, env = "MEDBUDDY_REPORT_DIR")]
    report_dir: Option<PathBuf>,

    /// Print the outcome as JSON instead of plain text.
    #[arg(long, env = "MEDBUDDY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MEDBUDDY_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "MEDBUDDY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    backend: BackendArgs,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "MEDBUDDY_BIND", default_value = "127.0.0.1:8501")]
    bind: std::net::SocketAddr,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "MEDBUDDY_MAX_UPLOAD_MB", default_value_t = 200)]
    max_upload_mb: u64,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// LLM provider: gemini, openai, anthropic, mistral, ollama.
    #[arg(long, env = "MEDBUDDY_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Model for PDF report analyses.
    #[arg(long, env = "MEDBUDDY_TEXT_MODEL", default_value = "gemini-2.0-flash")]
    text_model: String,

    /// Model for scan analyses (must accept images).
    #[arg(long, env = "MEDBUDDY_VISION_MODEL", default_value = "gemini-2.0-flash")]
    vision_model: String,

    /// LLM temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "MEDBUDDY_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens. Provider default when unset.
    #[arg(long, env = "MEDBUDDY_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Backend call timeout in seconds; 0 waits indefinitely.
    #[arg(long, env = "MEDBUDDY_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DomainArg {
    Brain,
    Heart,
}

impl From<DomainArg> for AnalysisDomain {
    fn from(v: DomainArg) -> Self {
        match v {
            DomainArg::Brain => AnalysisDomain::Brain,
            DomainArg::Heart => AnalysisDomain::Heart,
        }
    }
}

fn main() -> Result<()> {
    // Environment first: the runtime's worker threads must not observe
    // variables changing underneath them.
    dotenvy::dotenv().ok();
    alias_google_api_key();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?
        .block_on(run(cli))
}

/// The dashboard read `GOOGLE_API_KEY`; the Gemini provider reads
/// `GEMINI_API_KEY`. Accept either.
fn alias_google_api_key() {
    let gemini_set = std::env::var("GEMINI_API_KEY").is_ok_and(|v| !v.trim().is_empty());
    if !gemini_set {
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            std::env::set_var("GEMINI_API_KEY", key);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match cli.command {
        Command::Analyze(ref args) => !cli.quiet && !args.no_progress && !args.json,
        #[cfg(feature = "server")]
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    match cli.command {
        Command::Analyze(args) => analyze(args, show_progress, cli.quiet).await,
        #[cfg(feature = "server")]
        Command::Serve(args) => serve(args).await,
    }
}

async fn analyze(args: AnalyzeArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let mut builder = backend_config(&args.backend).download_timeout_secs(args.download_timeout);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // Missing credentials are fatal here, before any input is read.
    let pipeline = Pipeline::new(config).context("Backend is not usable")?;
    let domain = AnalysisDomain::from(args.domain);

    let outcome = pipeline
        .analyze_input(&args.input, domain)
        .await
        .context("Analysis failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
        println!("{json}");
    } else {
        print_outcome(&outcome).context("Failed to write to stdout")?;
    }

    let saved = match args.report_dir {
        Some(ref dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create report directory {:?}", dir))?;
            let report = pipeline
                .render_report(&outcome)
                .await
                .context("Report rendering failed")?;
            Some(
                report
                    .persist_into(dir)
                    .with_context(|| format!("Failed to save report into {:?}", dir))?,
            )
        }
        None => None,
    };

    if !quiet {
        if let Some(ref path) = saved {
            eprintln!("{}  report  →  {}", green("✔"), bold(&path.display().to_string()));
        }
        if !args.json {
            eprintln!(
                "   {} chars analysed  —  {}ms total",
                dim(&outcome.stats.analysis_chars.to_string()),
                outcome.stats.total_duration_ms,
            );
        }
    }

    Ok(())
}

fn print_outcome(outcome: &AnalysisOutcome) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "## {} {}", outcome.domain.label(), outcome.caption())?;
    if let Some((w, h)) = outcome.image_dimensions {
        writeln!(handle, "({w}x{h} px)")?;
    }
    writeln!(handle)?;
    handle.write_all(outcome.result.text.as_bytes())?;
    if !outcome.result.text.ends_with('\n') {
        handle.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(args: ServeArgs) -> Result<()> {
    let config = backend_config(&args.backend)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .build()
        .context("Invalid configuration")?;
    let pipeline = Arc::new(Pipeline::new(config).context("Backend is not usable")?);

    eprintln!(
        "{} {}",
        cyan("◆"),
        bold(&format!("medbuddy listening on http://{}", args.bind))
    );
    medbuddy::server::serve(args.bind, pipeline)
        .await
        .context("HTTP server failed")
}

/// Map the shared backend flags onto a config builder.
fn backend_config(args: &BackendArgs) -> medbuddy::AnalysisConfigBuilder {
    let mut builder = AnalysisConfig::builder()
        .provider_name(&args.provider)
        .text_model(&args.text_model)
        .vision_model(&args.vision_model);

    builder = match args.api_timeout {
        0 => builder.no_api_timeout(),
        secs => builder.api_timeout_secs(secs),
    };
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    builder
}
