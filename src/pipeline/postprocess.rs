//! Post-processing: deterministic tidy-up of backend text.
//!
//! The report renderer splits analyses on blank lines, so anything that
//! hides a blank line (CRLF endings, zero-width characters) or wraps the
//! whole answer in a code fence changes the report layout. These passes fix
//! only that and leave the wording alone.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF/CR → LF)
//! 2. Strip an outer ```` ```markdown ```` fence wrapping the whole answer
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, ...)
//! 4. Trim leading and trailing whitespace of the whole text

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all tidy-up rules to raw backend output.
pub fn tidy_analysis(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_markdown_fences(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*)\n```\s*$").expect("valid fence regex")
});

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_blank_lines_become_lf() {
        let out = tidy_analysis("1. Findings\r\n\r\nNormal heart rhythm.\r\n");
        assert_eq!(out, "1. Findings\n\nNormal heart rhythm.");
    }

    #[test]
    fn outer_fence_is_stripped() {
        let out = tidy_analysis("```markdown\n# Summary\n\nAll clear.\n```\n");
        assert_eq!(out, "# Summary\n\nAll clear.");
    }

    #[test]
    fn inner_fences_are_kept() {
        let input = "Intro\n\n```\nvalues\n```\n\nOutro";
        assert_eq!(tidy_analysis(input), input);
    }

    #[test]
    fn zero_width_space_does_not_hide_blank_line() {
        let out = tidy_analysis("A\n\u{200B}\nB");
        assert_eq!(out, "A\n\nB");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert!(tidy_analysis(" \r\n\t\u{FEFF}\n").is_empty());
    }

    #[test]
    fn inner_spacing_is_untouched() {
        let input = "1. Findings\n\n\n   indented body";
        assert_eq!(tidy_analysis(input), input);
    }
}
