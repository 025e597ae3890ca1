//! Error types for the medbuddy library.
//!
//! Each pipeline stage owns one error type so callers can tell at a glance
//! where a run stopped:
//!
//! * [`ExtractionError`]: the uploaded artifact could not be turned into
//!   text or pixels. The run stops before the backend is contacted.
//! * [`BackendError`]: the remote analysis call failed, timed out, or came
//!   back empty. The run stops before anything is rendered.
//! * [`RenderError`]: the transient report file could not be written or
//!   read back. Any partially written file is already gone.
//!
//! [`AnalysisError`] is the umbrella returned by [`crate::analyze::Pipeline`];
//! it also carries the configuration failures that are fatal at startup.
//! Nothing is retried and nothing is recovered silently: every variant ends
//! the current run.

use crate::domain::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

/// The input artifact could not be read or decoded.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension or declared type is not one we analyse.
    #[error("Unsupported media kind '{extension}': expected pdf, png, jpg or jpeg")]
    UnsupportedMediaKind { extension: String },

    /// Zero-byte upload.
    #[error("The uploaded file is empty")]
    EmptyUpload,

    /// Upload exceeds `AnalysisConfig::max_upload_bytes`.
    #[error("Upload is {size} bytes, above the {limit}-byte limit")]
    TooLarge { size: u64, limit: u64 },

    /// The bytes do not start with the signature of the declared kind.
    #[error("File does not look like a {declared} file\nFirst bytes: {magic:?}")]
    KindMismatch { declared: MediaKind, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// PDF is password protected.
    #[error("PDF is encrypted; remove the password before uploading it")]
    EncryptedPdf,

    /// A single page's content stream could not be decoded.
    #[error("Text extraction failed on page {page}: {detail}")]
    PageTextFailed { page: u32, detail: String },

    /// The image decoder rejected the bytes.
    #[error("Image could not be decoded: {detail}")]
    UndecodableImage { detail: String },

    /// The report decoded fine but yielded no text to analyse.
    #[error("No text could be extracted from the report.\nScanned reports should be uploaded as images.")]
    NoExtractableText,

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    TaskFailed(String),
}

/// The remote analysis call did not produce usable text.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// No answer arrived in time. `secs` is set when the client-side bound
    /// fired; `None` means the provider gave up on its own.
    #[error("Analysis backend timed out{}", after_secs(.secs))]
    Timeout { secs: Option<u64> },

    /// The provider returned an error (HTTP failure, auth, quota, ...).
    #[error("Analysis backend error: {message}")]
    Api { message: String },

    /// The provider answered, but with nothing to show.
    #[error("Analysis backend returned an empty response")]
    EmptyResponse,

    /// The scan could not be packed into the request body.
    #[error("Failed to encode scan for the backend: {detail}")]
    ImageEncoding { detail: String },
}

/// The transient report file could not be produced or served.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Creating, writing or reading the transient file failed.
    #[error("Failed to write report file: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },

    /// printpdf refused the document.
    #[error("PDF generation failed: {detail}")]
    Pdf { detail: String },

    /// The transient file could not be removed after use.
    #[error("Failed to remove transient report '{path}': {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking render task panicked or was cancelled.
    #[error("Render task failed: {0}")]
    TaskFailed(String),
}

impl From<std::io::Error> for RenderError {
    fn from(source: std::io::Error) -> Self {
        RenderError::Io { source }
    }
}

fn after_secs(secs: &Option<u64>) -> String {
    secs.map(|s| format!(" after {s}s")).unwrap_or_default()
}

/// All fatal errors returned by the medbuddy library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The configured provider cannot be used (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
