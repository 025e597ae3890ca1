//! End-to-end tests against the live analysis backend.
//!
//! These make real API calls. They are gated behind the `E2E_ENABLED`
//! environment variable and a Gemini key (`GEMINI_API_KEY` or
//! `GOOGLE_API_KEY`) so they do not run in CI unless explicitly requested.
//! Report fixtures are read from `./test_cases/` when present.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_scan -- --nocapture

use medbuddy::{
    AnalysisConfig, AnalysisDomain, MediaKind, Pipeline, ReportKind, UploadedArtifact,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

fn live_pipeline() -> Pipeline {
    if std::env::var("GEMINI_API_KEY").is_err() {
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            std::env::set_var("GEMINI_API_KEY", key);
        }
    }
    let config = AnalysisConfig::builder()
        .api_timeout_secs(180)
        .build()
        .expect("default config is valid");
    Pipeline::new(config).expect("GEMINI_API_KEY or GOOGLE_API_KEY must be set")
}

/// Skip this test unless E2E_ENABLED and an API key are set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("GEMINI_API_KEY").is_err() && std::env::var("GOOGLE_API_KEY").is_err() {
            println!("SKIP — set GEMINI_API_KEY or GOOGLE_API_KEY");
            return;
        }
    }};
    ($path:expr) => {{
        e2e_skip_unless_ready!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Assert the analysis passes basic quality checks.
fn assert_analysis_quality(text: &str, context: &str) {
    assert!(!text.trim().is_empty(), "[{context}] Analysis is empty");

    let first_line = text.lines().next().unwrap_or("");
    assert!(
        !first_line.starts_with("```"),
        "[{context}] Analysis must not start with a code fence, got: {first_line:?}"
    );

    let invisible = ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'];
    for ch in invisible {
        assert!(
            !text.contains(ch),
            "[{context}] Analysis contains invisible char U+{:04X}",
            ch as u32
        );
    }

    // Sections are what the report layout splits on.
    assert!(
        text.contains("\n\n"),
        "[{context}] Expected blank-line separated sections"
    );

    println!("[{context}] ✓  {} chars, quality checks passed", text.len());
}

// ── Scan (synthetic image) ───────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_synthetic_gradient() {
    e2e_skip_unless_ready!();

    let img = image::RgbImage::from_fn(256, 256, |x, y| {
        let v = ((x + y) / 2) as u8;
        image::Rgb([v, v, v])
    });
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let pipeline = live_pipeline();
    let outcome = pipeline
        .analyze(UploadedArtifact::new(png, MediaKind::Png), AnalysisDomain::Brain)
        .await
        .expect("scan analysis should succeed");

    assert_eq!(outcome.kind(), ReportKind::Scan);
    assert_analysis_quality(&outcome.result.text, "synthetic scan");

    let report = pipeline.render_report(&outcome).await.unwrap();
    let saved = report.persist_into(&output_dir()).unwrap();
    println!("Report written to {}", saved.display());
}

// ── Report (fixture PDF) ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_heart_fixture() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("heart_report.pdf"));

    let pipeline = live_pipeline();
    let outcome = pipeline
        .analyze_input(path.to_str().unwrap(), AnalysisDomain::Heart)
        .await
        .expect("report analysis should succeed");

    assert_eq!(outcome.kind(), ReportKind::Medical);
    assert!(outcome.stats.extracted_chars > 0);
    assert_analysis_quality(&outcome.result.text, "heart report");

    let report = pipeline.render_report(&outcome).await.unwrap();
    assert!(
        !report.outline().headings().is_empty(),
        "expected numbered sections to become headings"
    );
    let bytes = report.into_bytes().unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(pipeline.analyses_completed(), 1);
}

#[tokio::test]
async fn test_scan_brain_fixture() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("brain_mri.png"));

    let pipeline = live_pipeline();
    let outcome = pipeline
        .analyze_input(path.to_str().unwrap(), AnalysisDomain::Brain)
        .await
        .expect("scan analysis should succeed");

    assert_eq!(outcome.caption(), "Brain Scan");
    assert!(outcome.image_dimensions.is_some());
    assert_analysis_quality(&outcome.result.text, "brain scan");
}
