//! Small closed vocabularies shared by every stage: which organ is analysed,
//! what kind of artifact was uploaded, and which report family results in.

use crate::error::ExtractionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anatomical focus selected for a run. Fixed for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisDomain {
    Brain,
    Heart,
}

impl AnalysisDomain {
    pub const ALL: [AnalysisDomain; 2] = [AnalysisDomain::Brain, AnalysisDomain::Heart];

    /// Bare name interpolated into prompts and report titles.
    pub fn name(self) -> &'static str {
        match self {
            AnalysisDomain::Brain => "Brain",
            AnalysisDomain::Heart => "Heart",
        }
    }

    /// Decorated label for selection menus.
    pub fn label(self) -> &'static str {
        match self {
            AnalysisDomain::Brain => "🧠 Brain",
            AnalysisDomain::Heart => "❤️ Heart",
        }
    }
}

impl fmt::Display for AnalysisDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalysisDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brain" => Ok(AnalysisDomain::Brain),
            "heart" => Ok(AnalysisDomain::Heart),
            other => Err(format!("unknown analysis domain '{other}' (expected brain or heart)")),
        }
    }
}

/// Report family, derived from which kind of content was analysed.
///
/// Drives the prompt template and the download filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Analysis of text extracted from a PDF report.
    Medical,
    /// Analysis of a scan image.
    Scan,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Medical => "medical",
            ReportKind::Scan => "scan",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared media type of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Pdf,
    Png,
    Jpg,
    Jpeg,
}

impl MediaKind {
    /// Map a file extension (without the dot, any case) to a media kind.
    pub fn from_extension(ext: &str) -> Result<Self, ExtractionError> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Ok(MediaKind::Pdf),
            "png" => Ok(MediaKind::Png),
            "jpg" => Ok(MediaKind::Jpg),
            "jpeg" => Ok(MediaKind::Jpeg),
            _ => Err(ExtractionError::UnsupportedMediaKind {
                extension: ext.to_string(),
            }),
        }
    }

    /// Map a MIME type such as `image/png` to a media kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split(';').next().unwrap_or("").trim() {
            "application/pdf" => Some(MediaKind::Pdf),
            "image/png" => Some(MediaKind::Png),
            "image/jpeg" | "image/jpg" => Some(MediaKind::Jpeg),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Pdf => "pdf",
            MediaKind::Png => "png",
            MediaKind::Jpg => "jpg",
            MediaKind::Jpeg => "jpeg",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, MediaKind::Pdf)
    }

    /// The report family this artifact produces.
    pub fn report_kind(self) -> ReportKind {
        if self.is_image() {
            ReportKind::Scan
        } else {
            ReportKind::Medical
        }
    }

    /// Whether `bytes` begin with this kind's file signature.
    pub fn matches_signature(self, bytes: &[u8]) -> bool {
        match self {
            MediaKind::Pdf => bytes.starts_with(b"%PDF"),
            MediaKind::Png => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            MediaKind::Jpg | MediaKind::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parse_is_case_insensitive() {
        assert_eq!("Brain".parse::<AnalysisDomain>(), Ok(AnalysisDomain::Brain));
        assert_eq!(" HEART ".parse::<AnalysisDomain>(), Ok(AnalysisDomain::Heart));
        assert!("lung".parse::<AnalysisDomain>().is_err());
    }

    #[test]
    fn domain_display_is_bare_name() {
        assert_eq!(AnalysisDomain::Heart.to_string(), "Heart");
        assert!(AnalysisDomain::Brain.label().ends_with("Brain"));
    }

    #[test]
    fn media_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("PDF").unwrap(), MediaKind::Pdf);
        assert_eq!(MediaKind::from_extension("jpeg").unwrap(), MediaKind::Jpeg);
        assert!(matches!(
            MediaKind::from_extension("tiff"),
            Err(ExtractionError::UnsupportedMediaKind { .. })
        ));
    }

    #[test]
    fn report_kind_follows_media_kind() {
        assert_eq!(MediaKind::Pdf.report_kind(), ReportKind::Medical);
        assert_eq!(MediaKind::Jpg.report_kind(), ReportKind::Scan);
        assert_eq!(ReportKind::Scan.to_string(), "scan");
    }

    #[test]
    fn signatures() {
        assert!(MediaKind::Pdf.matches_signature(b"%PDF-1.7\n"));
        assert!(!MediaKind::Pdf.matches_signature(b"\x89PNG\r\n\x1a\n"));
        assert!(MediaKind::Jpeg.matches_signature(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!MediaKind::Png.matches_signature(b""));
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Png));
        assert_eq!(
            MediaKind::from_mime("application/pdf; charset=binary"),
            Some(MediaKind::Pdf)
        );
        assert_eq!(MediaKind::from_mime("text/plain"), None);
    }
}
