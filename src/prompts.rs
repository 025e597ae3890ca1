//! Prompt templates for report and scan analysis.
//!
//! Two fixed templates exist, chosen by the content variant of the run:
//! the text-report template appends the extracted report verbatim, the
//! image-scan template carries no document text because the scan itself is
//! sent alongside it. The domain name is substituted exactly once, in the
//! framing sentence; nothing else varies. Given the same content and domain
//! the output is byte-identical, which is what makes the rest of the
//! (non-deterministic) pipeline testable.

use crate::domain::{AnalysisDomain, ReportKind};
use crate::pipeline::extract::NormalizedContent;
use std::fmt;

/// Outline for analysing the text of a medical report.
///
/// `{domain}` is replaced with the domain name and `{report}` with the
/// extracted text.
pub const TEXT_REPORT_TEMPLATE: &str = r#"As a specialized medical AI assistant for {domain} analysis, provide a comprehensive evaluation:

1. 🔍 Key Findings:
   - Primary observations
   - Critical measurements
   - Notable patterns

2. 📋 Diagnostic Assessment:
   - Potential diagnoses (ranked by likelihood)
   - Supporting evidence
   - Differential diagnoses

3. ⚠️ Areas of Concern:
   - Critical abnormalities
   - Risk factors
   - Comparative analysis with normal ranges

4. 💡 Recommendations:
   - Suggested follow-up tests
   - Monitoring requirements
   - Specialist consultations if needed

5. 📊 Risk Assessment:
   - Severity indicators
   - Progression markers
   - Prognosis factors

Medical Report Content:
{report}
"#;

/// Outline for an imaging-specialist reading of a scan.
///
/// `{domain}` is replaced with the domain name.
pub const IMAGE_SCAN_TEMPLATE: &str = r#"As an expert medical imaging specialist focusing on {domain} scans, provide a detailed professional analysis:

1. 🔍 Technical Assessment:
   - Image quality
   - Positioning
   - Anatomical coverage

2. 📋 Structural Analysis:
   - Normal anatomical findings
   - Anatomical variants
   - Key measurements

3. ⚠️ Pathological Findings:
   - Abnormalities detected
   - Location and characteristics
   - Severity assessment

4. 💡 Clinical Correlation:
   - Potential clinical implications
   - Differential diagnoses
   - Risk stratification

5. 📊 Recommendations:
   - Follow-up imaging
   - Additional views/sequences
   - Clinical correlation needs
"#;

/// A finished instruction for the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    kind: ReportKind,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Which template produced this prompt.
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Build the prompt for `content` framed for `domain`.
pub fn build(content: &NormalizedContent, domain: AnalysisDomain) -> Prompt {
    match content {
        NormalizedContent::PlainText(text) => text_report_prompt(text, domain),
        NormalizedContent::DecodedImage(_) => image_scan_prompt(domain),
    }
}

/// Text-report template with `report` appended verbatim.
pub fn text_report_prompt(report: &str, domain: AnalysisDomain) -> Prompt {
    // Substitute the domain first so braces inside the report are never
    // mistaken for placeholders.
    let (head, tail) = TEXT_REPORT_TEMPLATE
        .split_once("{report}")
        .unwrap_or((TEXT_REPORT_TEMPLATE, ""));
    let mut text = head.replace("{domain}", domain.name());
    text.push_str(report);
    text.push_str(tail);
    Prompt {
        text,
        kind: ReportKind::Medical,
    }
}

/// Image-scan template; the scan travels separately.
pub fn image_scan_prompt(domain: AnalysisDomain) -> Prompt {
    Prompt {
        text: IMAGE_SCAN_TEMPLATE.replace("{domain}", domain.name()),
        kind: ReportKind::Scan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::DecodedImage;
    use image::{DynamicImage, RgbImage};

    const TEXT_SECTIONS: [&str; 5] = [
        "Key Findings",
        "Diagnostic Assessment",
        "Areas of Concern",
        "Recommendations",
        "Risk Assessment",
    ];

    const SCAN_SECTIONS: [&str; 5] = [
        "Technical Assessment",
        "Structural Analysis",
        "Pathological Findings",
        "Clinical Correlation",
        "Recommendations",
    ];

    fn assert_in_order(haystack: &str, needles: &[&str]) {
        let mut from = 0;
        for n in needles {
            let pos = haystack[from..]
                .find(n)
                .unwrap_or_else(|| panic!("'{n}' missing or out of order"));
            from += pos + n.len();
        }
    }

    #[test]
    fn text_prompt_is_deterministic() {
        for domain in AnalysisDomain::ALL {
            let content = NormalizedContent::PlainText("BP 120/80. ECG normal.".into());
            assert_eq!(build(&content, domain), build(&content, domain));
        }
    }

    #[test]
    fn text_prompt_has_five_sections_then_report() {
        let p = text_report_prompt("Troponin within range.", AnalysisDomain::Heart);
        assert_eq!(p.kind(), ReportKind::Medical);
        assert_in_order(p.as_str(), &TEXT_SECTIONS);
        assert!(p.as_str().contains("Medical Report Content:\nTroponin within range.\n"));
        assert!(p.as_str().trim_end().ends_with("Troponin within range."));
    }

    #[test]
    fn domain_interpolated_exactly_once() {
        let p = text_report_prompt("Unremarkable study.", AnalysisDomain::Heart);
        assert_eq!(p.as_str().matches("Heart").count(), 1);
        assert!(p.as_str().starts_with("As a specialized medical AI assistant for Heart analysis"));

        let p = image_scan_prompt(AnalysisDomain::Brain);
        assert_eq!(p.as_str().matches("Brain").count(), 1);
    }

    #[test]
    fn report_braces_are_not_placeholders() {
        let p = text_report_prompt("value {domain} literal", AnalysisDomain::Brain);
        assert!(p.as_str().contains("value {domain} literal"));
    }

    #[test]
    fn scan_prompt_ignores_pixels() {
        let small = NormalizedContent::DecodedImage(DecodedImage::new(
            DynamicImage::ImageRgb8(RgbImage::new(2, 2)),
        ));
        let large = NormalizedContent::DecodedImage(DecodedImage::new(
            DynamicImage::ImageRgb8(RgbImage::new(64, 32)),
        ));
        let a = build(&small, AnalysisDomain::Brain);
        let b = build(&large, AnalysisDomain::Brain);
        assert_eq!(a, b);
        assert_eq!(a.kind(), ReportKind::Scan);
        assert_in_order(a.as_str(), &SCAN_SECTIONS);
        assert!(!a.as_str().contains("Medical Report Content"));
    }
}
