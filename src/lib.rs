//! # medbuddy
//!
//! Analyse medical reports and scans with a generative-AI backend, then
//! export the analysis as a downloadable PDF.
//!
//! ## What goes in, what comes out
//!
//! A run takes one uploaded artifact and an anatomical focus (Brain or
//! Heart):
//!
//! * a **PDF report** is read through its text layer and sent with the
//!   medical-report prompt to the text-completion model;
//! * a **PNG/JPEG scan** is decoded and sent with the scan prompt to the
//!   multimodal model.
//!
//! The reply is free text loosely organised into numbered sections. On
//! request it is laid out as a PDF (title, timestamp, one heading or
//! paragraph per section) in a transient file that is deleted as soon as
//! it has been handed over.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Input    path / URL / multipart bytes → UploadedArtifact
//!  ├─ 2. Extract  PDF text layer or decoded pixels (spawn_blocking)
//!  ├─ 3. Prompt   fixed template for the report kind, domain filled in
//!  ├─ 4. Analyze  one backend round-trip (gemini-2.0-flash by default)
//!  ├─ 5. Tidy     line endings, outer fences, invisible characters
//!  └─ 6. Render   on demand: PDF in a transient file → download
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbuddy::{AnalysisConfig, AnalysisDomain, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY (or GOOGLE_API_KEY) from the environment.
//!     let pipeline = Pipeline::new(AnalysisConfig::default())?;
//!     let outcome = pipeline.analyze_input("echo.pdf", AnalysisDomain::Heart).await?;
//!     println!("{}", outcome.result.text);
//!
//!     let report = pipeline.render_report(&outcome).await?;
//!     let saved = report.persist_into(std::path::Path::new("."))?;
//!     eprintln!("report saved to {}", saved.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `medbuddy` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the axum HTTP shell behind `medbuddy serve` |
//!
//! Disable both when using only the library:
//! ```toml
//! medbuddy = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::Pipeline;
pub use config::{AnalysisConfig, AnalysisConfigBuilder, DEFAULT_MAX_UPLOAD_BYTES};
pub use domain::{AnalysisDomain, MediaKind, ReportKind};
pub use error::{AnalysisError, BackendError, ExtractionError, RenderError};
pub use output::{AnalysisOutcome, AnalysisResult, AnalysisStats};
pub use pipeline::extract::{extract, DecodedImage, NormalizedContent};
pub use pipeline::input::{resolve_input, UploadedArtifact};
pub use pipeline::llm::{AnalysisBackend, AnalysisClient, LlmBackend};
pub use pipeline::render::{ReportBlock, ReportHandle, ReportOutline, ReportRenderer};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, PipelineStage, ProgressCallback};
pub use prompts::Prompt;
