//! Input resolution: turn a path, URL or raw upload into an [`UploadedArtifact`].
//!
//! An artifact is the uploaded bytes plus the media kind they were declared
//! as. Nothing is written to disk: the bytes are held in memory for the one
//! run that owns them and dropped when it ends. Before any decoder sees the
//! bytes we check size limits and the file signature so a mislabelled upload
//! fails with a clear message instead of a decoder error.

use crate::domain::MediaKind;
use crate::error::ExtractionError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw bytes of one upload and their declared media kind.
#[derive(Clone)]
pub struct UploadedArtifact {
    bytes: Vec<u8>,
    kind: MediaKind,
    name: Option<String>,
}

impl std::fmt::Debug for UploadedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedArtifact")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadedArtifact {
    pub fn new(bytes: impl Into<Vec<u8>>, kind: MediaKind) -> Self {
        Self {
            bytes: bytes.into(),
            kind,
            name: None,
        }
    }

    /// Attach the original file name (used only for logging).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Read a local file, inferring the kind from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let kind = kind_for_path(path)?;
        let bytes = std::fs::read(path).map_err(|e| read_error(path, e))?;
        Ok(Self::new(bytes, kind).with_name(display_name(path)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reject empty, oversized or mislabelled uploads.
    pub fn validate(&self, max_bytes: u64) -> Result<(), ExtractionError> {
        if self.bytes.is_empty() {
            return Err(ExtractionError::EmptyUpload);
        }
        let size = self.bytes.len() as u64;
        if size > max_bytes {
            return Err(ExtractionError::TooLarge {
                size,
                limit: max_bytes,
            });
        }
        if !self.kind.matches_signature(&self.bytes) {
            let magic = self.bytes.iter().take(8).copied().collect();
            return Err(ExtractionError::KindMismatch {
                declared: self.kind,
                magic,
            });
        }
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Infer the media kind from a path's extension.
pub fn kind_for_path(path: &Path) -> Result<MediaKind, ExtractionError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    MediaKind::from_extension(ext)
}

/// Resolve a local path or HTTP(S) URL into an in-memory artifact.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<UploadedArtifact, ExtractionError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

async fn resolve_local(path_str: &str) -> Result<UploadedArtifact, ExtractionError> {
    let path = PathBuf::from(path_str);
    let kind = kind_for_path(&path)?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| read_error(&path, e))?;

    debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), kind);
    Ok(UploadedArtifact::new(bytes, kind).with_name(display_name(&path)))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedArtifact, ExtractionError> {
    info!("Downloading artifact from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractionError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractionError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractionError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let kind = kind_for_url(url, content_type.as_deref())?;
    let name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractionError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes ({})", bytes.len(), kind);

    let artifact = UploadedArtifact::new(bytes.to_vec(), kind);
    Ok(match name {
        Some(n) => artifact.with_name(n),
        None => artifact,
    })
}

/// Pick the media kind from the URL's file extension, else the Content-Type.
fn kind_for_url(url: &str, content_type: Option<&str>) -> Result<MediaKind, ExtractionError> {
    if let Some(name) = filename_from_url(url) {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if let Ok(kind) = MediaKind::from_extension(ext) {
                return Ok(kind);
            }
        }
    }
    content_type
        .and_then(MediaKind::from_mime)
        .ok_or_else(|| ExtractionError::UnsupportedMediaKind {
            extension: content_type.unwrap_or("unknown").to_string(),
        })
}

/// Last non-empty path segment of a URL.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_error(path: &Path, e: std::io::Error) -> ExtractionError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractionError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractionError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}
