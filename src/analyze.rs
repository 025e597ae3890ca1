//! Analysis entry points: one [`Pipeline`] per process, one run per upload.
//!
//! A run goes extract → build prompt → analyze, strictly in that order, and
//! stops at the first failure. Rendering is a separate call: the caller
//! shows the analysis first and asks for the PDF only when the user wants
//! to download it.
//!
//! The pipeline holds no per-run state. The only thing shared between runs
//! is the completed-analyses counter, so one `Pipeline` behind an `Arc` can
//! serve concurrent requests.

use crate::config::AnalysisConfig;
use crate::domain::AnalysisDomain;
use crate::error::{AnalysisError, ExtractionError, RenderError};
use crate::output::{AnalysisOutcome, AnalysisResult, AnalysisStats};
use crate::pipeline::extract::{extract_blocking, NormalizedContent};
use crate::pipeline::input::{resolve_input, UploadedArtifact};
use crate::pipeline::llm::{AnalysisBackend, AnalysisClient};
use crate::pipeline::render::{ReportHandle, ReportRenderer};
use crate::progress::PipelineStage;
use crate::prompts;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The analysis pipeline, configured once at startup.
pub struct Pipeline {
    config: AnalysisConfig,
    client: AnalysisClient,
    renderer: ReportRenderer,
    completed: AtomicU64,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("completed", &self.analyses_completed())
            .finish()
    }
}

impl Pipeline {
    /// Build the pipeline and its backend.
    ///
    /// # Errors
    /// [`AnalysisError::ProviderNotConfigured`] when no credential is set for
    /// the configured provider. Callers should treat this as fatal at
    /// startup rather than retrying per request.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = AnalysisClient::from_config(&config)?;
        let renderer = ReportRenderer::from_config(&config);
        Ok(Self {
            config,
            client,
            renderer,
            completed: AtomicU64::new(0),
        })
    }

    /// Build the pipeline around a ready-made backend.
    pub fn with_backend(
        mut config: AnalysisConfig,
        backend: Arc<dyn AnalysisBackend>,
    ) -> Result<Self, AnalysisError> {
        config.backend = Some(backend);
        Self::new(config)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Number of analyses that have finished successfully since startup.
    pub fn analyses_completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Resolve a local path or URL, then [`analyze`](Self::analyze) it.
    pub async fn analyze_input(
        &self,
        input: &str,
        domain: AnalysisDomain,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let artifact = resolve_input(input, self.config.download_timeout_secs).await?;
        self.analyze(artifact, domain).await
    }

    /// Analyse one artifact for `domain`.
    ///
    /// # Errors
    /// - [`AnalysisError::Extraction`]: the upload is empty, too large,
    ///   mislabelled, corrupt, or (for PDFs) has no text layer. The backend
    ///   is not contacted.
    /// - [`AnalysisError::Backend`]: the backend failed, timed out, or
    ///   returned nothing.
    pub async fn analyze(
        &self,
        artifact: UploadedArtifact,
        domain: AnalysisDomain,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let total_start = Instant::now();
        info!(
            "Starting {} analysis of {} ({}, {} bytes)",
            domain,
            artifact.name().unwrap_or("upload"),
            artifact.kind(),
            artifact.len()
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(artifact.kind().report_kind(), PipelineStage::ANALYSIS.len());
        }

        let outcome = self.run(artifact, domain, total_start).await;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(outcome.is_ok());
        }

        match outcome {
            Ok(outcome) => {
                let n = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    "{} complete in {}ms (analysis #{})",
                    outcome.caption(),
                    outcome.stats.total_duration_ms,
                    n
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!("{} analysis failed: {}", domain, e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        artifact: UploadedArtifact,
        domain: AnalysisDomain,
        total_start: Instant,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let mut stats = AnalysisStats {
            source_bytes: artifact.len() as u64,
            ..Default::default()
        };

        // ── Stage 1: Extract ─────────────────────────────────────────────
        let start = self.stage_start(PipelineStage::Extract);
        let content = self.stage_finish(
            PipelineStage::Extract,
            start,
            self.extract(artifact).await,
        )?;
        stats.extract_duration_ms = start.elapsed().as_millis() as u64;
        stats.extracted_chars = content.as_text().map(|t| t.chars().count()).unwrap_or(0);
        let image_dimensions = content.as_image().map(|img| img.dimensions());

        // ── Stage 2: Build prompt ────────────────────────────────────────
        let start = self.stage_start(PipelineStage::BuildPrompt);
        let prompt = prompts::build(&content, domain);
        self.stage_finish::<_, AnalysisError>(PipelineStage::BuildPrompt, start, Ok(()))?;
        stats.prompt_chars = prompt.as_str().chars().count();
        debug!("Prompt: {} chars ({})", stats.prompt_chars, prompt.kind());

        // ── Stage 3: Analyze ─────────────────────────────────────────────
        let start = self.stage_start(PipelineStage::Analyze);
        let result = self.stage_finish(
            PipelineStage::Analyze,
            start,
            self.client.analyze(&prompt, &content).await,
        )?;
        stats.backend_duration_ms = start.elapsed().as_millis() as u64;
        stats.analysis_chars = result.text.chars().count();
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        Ok(AnalysisOutcome {
            domain,
            result,
            image_dimensions,
            stats,
        })
    }

    /// Validate, decode, and refuse content with nothing to analyse.
    async fn extract(&self, artifact: UploadedArtifact) -> Result<NormalizedContent, ExtractionError> {
        artifact.validate(self.config.max_upload_bytes)?;
        let content = extract_blocking(artifact).await?;

        if content.is_empty() {
            return Err(match content {
                NormalizedContent::PlainText(_) => ExtractionError::NoExtractableText,
                NormalizedContent::DecodedImage(_) => ExtractionError::UndecodableImage {
                    detail: "image has no pixels".to_string(),
                },
            });
        }
        Ok(content)
    }

    /// Render a finished analysis as a PDF in a transient file.
    pub async fn render_report(&self, outcome: &AnalysisOutcome) -> Result<ReportHandle, AnalysisError> {
        self.render_result(&outcome.result, outcome.domain).await
    }

    /// Render any analysis text as a PDF in a transient file.
    ///
    /// The returned handle owns the file: read it with
    /// [`ReportHandle::into_bytes`] or drop it, and the file is gone.
    pub async fn render_result(
        &self,
        result: &AnalysisResult,
        domain: AnalysisDomain,
    ) -> Result<ReportHandle, AnalysisError> {
        let start = self.stage_start(PipelineStage::Render);

        let renderer = self.renderer.clone();
        let result = result.clone();
        let rendered = match tokio::task::spawn_blocking(move || renderer.render(&result, domain)).await {
            Ok(rendered) => rendered,
            Err(e) => Err(RenderError::TaskFailed(format!("Render task panicked: {}", e))),
        };

        Ok(self.stage_finish(PipelineStage::Render, start, rendered)?)
    }

    /// [`analyze`](Self::analyze) then [`render_report`](Self::render_report).
    pub async fn analyze_and_render(
        &self,
        artifact: UploadedArtifact,
        domain: AnalysisDomain,
    ) -> Result<(AnalysisOutcome, ReportHandle), AnalysisError> {
        let outcome = self.analyze(artifact, domain).await?;
        let report = self.render_report(&outcome).await?;
        Ok((outcome, report))
    }

    // ── Progress helpers ─────────────────────────────────────────────────

    fn stage_start(&self, stage: PipelineStage) -> Instant {
        debug!("Stage {} started", stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn stage_finish<T, E: fmt::Display>(
        &self,
        stage: PipelineStage,
        start: Instant,
        result: Result<T, E>,
    ) -> Result<T, E> {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                debug!("Stage {} finished in {}ms", stage, elapsed_ms);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_stage_complete(stage, elapsed_ms);
                }
            }
            Err(e) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_stage_error(stage, &e.to_string());
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MediaKind;
    use crate::error::BackendError;
    use crate::pipeline::extract::DecodedImage;
    use crate::progress::PipelineProgressCallback;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct Fixed {
        reply: Result<String, BackendError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(err: BackendError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AnalysisBackend for Fixed {
        async fn generate_from_text(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }

        async fn generate_from_text_and_image(
            &self,
            _prompt: &str,
            _image: &DecodedImage,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl PipelineProgressCallback for Events {
        fn on_stage_start(&self, stage: PipelineStage) {
            self.0.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_stage_complete(&self, stage: PipelineStage, _elapsed_ms: u64) {
            self.0.lock().unwrap().push(format!("done:{stage}"));
        }

        fn on_stage_error(&self, stage: PipelineStage, _error: &str) {
            self.0.lock().unwrap().push(format!("error:{stage}"));
        }

        fn on_run_complete(&self, success: bool) {
            self.0.lock().unwrap().push(format!("run:{success}"));
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(w, h));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn empty_upload_never_reaches_backend() {
        let backend = Fixed::ok("unused");
        let pipeline = Pipeline::with_backend(AnalysisConfig::default(), backend.clone()).unwrap();
        let err = pipeline
            .analyze(UploadedArtifact::new(Vec::new(), MediaKind::Pdf), AnalysisDomain::Heart)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Extraction(ExtractionError::EmptyUpload)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.analyses_completed(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let config = AnalysisConfig::builder().max_upload_bytes(16).build().unwrap();
        let pipeline = Pipeline::with_backend(config, Fixed::ok("unused")).unwrap();
        let err = pipeline
            .analyze(UploadedArtifact::new(png(8, 8), MediaKind::Png), AnalysisDomain::Brain)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Extraction(ExtractionError::TooLarge { limit: 16, .. })
        ));
    }

    #[tokio::test]
    async fn scan_run_reports_every_stage_in_order() {
        let events = Arc::new(Events::default());
        let config = AnalysisConfig::builder()
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let pipeline = Pipeline::with_backend(config, Fixed::ok("1. Findings\n\nNo lesions.")).unwrap();

        let outcome = pipeline
            .analyze(UploadedArtifact::new(png(12, 9), MediaKind::Png), AnalysisDomain::Brain)
            .await
            .unwrap();
        assert_eq!(outcome.image_dimensions, Some((12, 9)));
        assert_eq!(outcome.caption(), "Brain Scan");
        assert_eq!(pipeline.analyses_completed(), 1);

        assert_eq!(
            *events.0.lock().unwrap(),
            vec![
                "start:extract",
                "done:extract",
                "start:build-prompt",
                "done:build-prompt",
                "start:analyze",
                "done:analyze",
                "run:true",
            ]
        );
    }

    #[tokio::test]
    async fn backend_failure_stops_the_run() {
        let events = Arc::new(Events::default());
        let config = AnalysisConfig::builder()
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let pipeline = Pipeline::with_backend(
            config,
            Fixed::failing(BackendError::Api {
                message: "quota exceeded".into(),
            }),
        )
        .unwrap();

        let err = pipeline
            .analyze(UploadedArtifact::new(png(4, 4), MediaKind::Png), AnalysisDomain::Heart)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Backend(BackendError::Api { .. })));
        assert_eq!(pipeline.analyses_completed(), 0);

        let events = events.0.lock().unwrap();
        assert_eq!(events[events.len() - 2], "error:analyze");
        assert_eq!(events[events.len() - 1], "run:false");
    }

    #[tokio::test]
    async fn render_result_uses_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig::builder().report_dir(dir.path()).build().unwrap();
        let pipeline = Pipeline::with_backend(config, Fixed::ok("unused")).unwrap();

        let handle = pipeline
            .render_result(
                &AnalysisResult::new("# Summary\n\nAll clear.", crate::domain::ReportKind::Medical),
                AnalysisDomain::Heart,
            )
            .await
            .unwrap();
        assert!(handle.path().starts_with(dir.path()));
        drop(handle);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
