//! Results of an analysis run.

use crate::domain::{AnalysisDomain, ReportKind};
use serde::{Deserialize, Serialize};

/// Free-form text returned by the backend.
///
/// Loosely structured into sections separated by blank lines; no schema is
/// guaranteed beyond that. Never empty: the client rejects blank responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    /// Report family the analysis belongs to.
    pub kind: ReportKind,
}

impl AnalysisResult {
    pub fn new(text: impl Into<String>, kind: ReportKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Timing and size figures for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Size of the uploaded artifact.
    pub source_bytes: u64,
    /// Characters of text recovered from a PDF (0 for scans).
    pub extracted_chars: usize,
    pub prompt_chars: usize,
    pub analysis_chars: usize,
    pub extract_duration_ms: u64,
    pub backend_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a caller needs to display a finished analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub domain: AnalysisDomain,
    pub result: AnalysisResult,
    /// Width and height of the analysed scan, if the artifact was an image.
    pub image_dimensions: Option<(u32, u32)>,
    pub stats: AnalysisStats,
}

impl AnalysisOutcome {
    pub fn kind(&self) -> ReportKind {
        self.result.kind
    }

    /// Caption shown next to a scan, e.g. "Brain Scan".
    pub fn caption(&self) -> String {
        match self.kind() {
            ReportKind::Scan => format!("{} Scan", self.domain),
            ReportKind::Medical => format!("{} Report", self.domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serialises_kind_lowercase() {
        let outcome = AnalysisOutcome {
            domain: AnalysisDomain::Brain,
            result: AnalysisResult::new("1. Findings", ReportKind::Scan),
            image_dimensions: Some((512, 512)),
            stats: AnalysisStats::default(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"]["kind"], "scan");
        assert_eq!(json["domain"], "Brain");
        assert_eq!(outcome.caption(), "Brain Scan");
    }
}
