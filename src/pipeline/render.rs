//! Report rendering: analysis text → paginated PDF in a transient file.
//!
//! Rendering happens in two steps. [`ReportOutline::plan`] turns the text
//! into an ordered list of styled blocks: title, timestamp, then one block
//! per non-empty section with a spacer after each. The PDF writer then lays
//! those blocks out top to bottom on US Letter pages, wrapping lines and
//! starting a new page when the bottom margin is reached.
//!
//! ## Section classification
//!
//! Sections are the pieces between blank lines (`"\n\n"`). A section is a
//! heading when it starts with `#` or with exactly one of `1.` … `5.`; every
//! other section is body text. The test looks at the raw section, so
//! `"10. Something"` and `" 1. indented"` are body text. Each section is
//! classified on its own, with no state carried between sections.
//!
//! ## Transient files
//!
//! The PDF is written to a `tempfile` that [`ReportHandle`] owns. Consuming
//! the handle (reading it back, copying it out) or dropping it deletes the
//! file. If writing fails halfway, the half-written file is deleted before
//! the error is returned.

use crate::config::AnalysisConfig;
use crate::domain::{AnalysisDomain, ReportKind};
use crate::error::RenderError;
use crate::output::AnalysisResult;
use chrono::NaiveDateTime;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

/// MIME type of every rendered report.
pub const REPORT_MIME: &str = "application/pdf";

const HEADING_MARKERS: [&str; 5] = ["1.", "2.", "3.", "4.", "5."];

// Layout, in PDF points (1/72 inch). US Letter, one-inch margins.
const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const MARGIN_PT: f32 = 72.0;
const USABLE_WIDTH_PT: f32 = PAGE_WIDTH_PT - 2.0 * MARGIN_PT;
const MM_PER_PT: f32 = 25.4 / 72.0;
const LEADING: f32 = 1.2;

const TITLE_SIZE: f32 = 24.0;
const TITLE_SPACE_AFTER: f32 = 30.0;
const HEADING_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 12.0;
const PARAGRAPH_SPACE_AFTER: f32 = 12.0;
const TITLE_BLOCK_SPACER: f32 = 20.0;
const SECTION_SPACER: f32 = 12.0;

/// One styled element of a report, in layout order.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportBlock {
    Title(String),
    Timestamp(String),
    Heading(String),
    Body(String),
    /// Vertical gap in points.
    Spacer(f32),
}

impl ReportBlock {
    /// Title and section headings share the heading style family.
    pub fn is_heading(&self) -> bool {
        matches!(self, ReportBlock::Title(_) | ReportBlock::Heading(_))
    }
}

/// The ordered blocks a report is laid out from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportOutline {
    blocks: Vec<ReportBlock>,
}

impl ReportOutline {
    /// Plan the blocks for `result`, titled for `domain`, stamped `generated_at`.
    pub fn plan(result: &AnalysisResult, domain: AnalysisDomain, generated_at: NaiveDateTime) -> Self {
        let mut blocks = vec![
            ReportBlock::Title(report_title(domain)),
            ReportBlock::Timestamp(format!(
                "Generated on: {}",
                generated_at.format("%Y-%m-%d %H:%M:%S")
            )),
            ReportBlock::Spacer(TITLE_BLOCK_SPACER),
        ];

        for section in split_sections(&result.text) {
            let text = section.trim().to_string();
            if is_heading_section(section) {
                blocks.push(ReportBlock::Heading(text));
            } else {
                blocks.push(ReportBlock::Body(text));
            }
            blocks.push(ReportBlock::Spacer(SECTION_SPACER));
        }

        Self { blocks }
    }

    pub fn blocks(&self) -> &[ReportBlock] {
        &self.blocks
    }

    pub fn title(&self) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            ReportBlock::Title(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Section headings, excluding the title.
    pub fn headings(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ReportBlock::Heading(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn bodies(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ReportBlock::Body(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// `"Medical Analysis Report - {domain}"`.
pub fn report_title(domain: AnalysisDomain) -> String {
    format!("Medical Analysis Report - {}", domain)
}

/// `{kind}_analysis_{YYYYMMDD_HHMMSS}.pdf`.
pub fn download_filename(kind: ReportKind, at: NaiveDateTime) -> String {
    format!("{}_analysis_{}.pdf", kind, at.format("%Y%m%d_%H%M%S"))
}

/// Non-blank pieces of `text` between `"\n\n"` separators, untrimmed.
pub fn split_sections(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").filter(|s| !s.trim().is_empty())
}

/// Heading iff the raw section starts with `#` or one of `1.`–`5.`.
pub fn is_heading_section(section: &str) -> bool {
    section.starts_with('#') || HEADING_MARKERS.iter().any(|m| section.starts_with(m))
}

/// Writes reports into transient files.
#[derive(Debug, Clone, Default)]
pub struct ReportRenderer {
    dir: Option<PathBuf>,
}

impl ReportRenderer {
    /// `dir` is where transient files go; `None` means the system temp dir.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.report_dir.clone())
    }

    /// Render `result` stamped with the current local time.
    pub fn render(
        &self,
        result: &AnalysisResult,
        domain: AnalysisDomain,
    ) -> Result<ReportHandle, RenderError> {
        self.render_at(result, domain, chrono::Local::now().naive_local())
    }

    /// Render `result` stamped with `generated_at`.
    pub fn render_at(
        &self,
        result: &AnalysisResult,
        domain: AnalysisDomain,
        generated_at: NaiveDateTime,
    ) -> Result<ReportHandle, RenderError> {
        self.render_with(result, domain, generated_at, |outline, title, file| {
            write_pdf(outline, title, file)
        })
    }

    /// Create the transient file and fill it with `write`. If `write` fails
    /// the partial file is deleted before the error is returned.
    fn render_with<F>(
        &self,
        result: &AnalysisResult,
        domain: AnalysisDomain,
        generated_at: NaiveDateTime,
        write: F,
    ) -> Result<ReportHandle, RenderError>
    where
        F: FnOnce(&ReportOutline, &str, &mut File) -> Result<usize, RenderError>,
    {
        let outline = ReportOutline::plan(result, domain, generated_at);
        let title = report_title(domain);

        let mut builder = tempfile::Builder::new();
        builder.prefix("medbuddy-").suffix(".pdf");
        let mut tmp = match self.dir {
            Some(ref dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // An early return drops `tmp`, which deletes the partial file.
        let pages = write(&outline, &title, tmp.as_file_mut())?;
        let byte_len = tmp.as_file().metadata()?.len();
        let path = tmp.into_temp_path();

        info!(
            "Rendered {} report: {} pages, {} bytes → {}",
            domain,
            pages,
            byte_len,
            path.display()
        );

        Ok(ReportHandle {
            path,
            byte_len,
            filename: download_filename(result.kind, generated_at),
            outline,
        })
    }
}

/// A rendered report in a transient file. The file lives exactly as long
/// as the handle.
#[derive(Debug)]
pub struct ReportHandle {
    path: TempPath,
    byte_len: u64,
    filename: String,
    outline: ReportOutline,
}

impl ReportHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn mime_type(&self) -> &'static str {
        REPORT_MIME
    }

    /// Name offered to the user when downloading.
    pub fn download_filename(&self) -> &str {
        &self.filename
    }

    pub fn outline(&self) -> &ReportOutline {
        &self.outline
    }

    /// Read the whole report and delete the transient file.
    pub fn into_bytes(self) -> Result<Vec<u8>, RenderError> {
        let bytes = std::fs::read(&self.path)?;
        self.discard()?;
        Ok(bytes)
    }

    /// Copy the report into `dir` under its download filename and delete
    /// the transient file. Returns the final path.
    ///
    /// An existing file is never overwritten: on a name clash the copy gets
    /// a `_1`, `_2`, ... suffix before the extension.
    pub fn persist_into(self, dir: &Path) -> Result<PathBuf, RenderError> {
        let (target, mut out) = create_unique(dir, &self.filename)?;
        let copied = File::open(&self.path).and_then(|mut src| std::io::copy(&mut src, &mut out));
        drop(out);
        if let Err(e) = copied {
            let _ = std::fs::remove_file(&target);
            return Err(e.into());
        }
        self.discard()?;
        Ok(target)
    }

    /// Delete the transient file now, surfacing any I/O error.
    pub fn discard(self) -> Result<(), RenderError> {
        let path = self.path.to_path_buf();
        self.path
            .close()
            .map_err(|source| RenderError::Cleanup { path, source })
    }
}

/// Create `name` in `dir`, or the first free `{stem}_{n}.{ext}` variant.
fn create_unique(dir: &Path, name: &str) -> Result<(PathBuf, File), RenderError> {
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 0u32;
    loop {
        let candidate = match (n, ext) {
            (0, _) => name.to_string(),
            (_, "") => format!("{stem}_{n}"),
            _ => format!("{stem}_{n}.{ext}"),
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{} exists, trying next suffix", path.display());
                n += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// ── PDF writing ──────────────────────────────────────────────────────────────

/// Lay out `outline` and save it into `out`. Returns the page count.
fn write_pdf<W: Write>(outline: &ReportOutline, title: &str, out: &mut W) -> Result<usize, RenderError> {
    let (doc, page, layer) = PdfDocument::new(
        title,
        Mm(PAGE_WIDTH_PT * MM_PER_PT),
        Mm(PAGE_HEIGHT_PT * MM_PER_PT),
        "Layer 1",
    );
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;

    let pages = {
        let mut cursor = PageCursor {
            doc: &doc,
            layer: doc.get_page(page).get_layer(layer),
            y: PAGE_HEIGHT_PT - MARGIN_PT,
            pages: 1,
        };

        for block in outline.blocks() {
            match block {
                ReportBlock::Title(t) => cursor.paragraph(t, TITLE_SIZE, &bold, TITLE_SPACE_AFTER),
                ReportBlock::Heading(t) => {
                    cursor.paragraph(t, HEADING_SIZE, &bold, PARAGRAPH_SPACE_AFTER)
                }
                ReportBlock::Timestamp(t) | ReportBlock::Body(t) => {
                    cursor.paragraph(t, BODY_SIZE, &regular, PARAGRAPH_SPACE_AFTER)
                }
                ReportBlock::Spacer(gap) => cursor.space(*gap),
            }
        }
        cursor.pages
    };

    let mut writer = BufWriter::new(out);
    doc.save(&mut writer).map_err(pdf_error)?;
    writer.flush()?;
    Ok(pages)
}

fn pdf_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf {
        detail: e.to_string(),
    }
}

/// Tracks the write position; adds pages as text flows past the margin.
struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    /// Baseline of the next line, in points from the page bottom.
    y: f32,
    pages: usize,
}

impl PageCursor<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH_PT * MM_PER_PT),
            Mm(PAGE_HEIGHT_PT * MM_PER_PT),
            "Layer 1",
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT_PT - MARGIN_PT;
        self.pages += 1;
        debug!("Started page {}", self.pages);
    }

    /// Move down by `gap`, stopping at the bottom margin. The next line
    /// that does not fit starts a new page.
    fn space(&mut self, gap: f32) {
        self.y = (self.y - gap).max(MARGIN_PT);
    }

    fn paragraph(&mut self, text: &str, size: f32, font: &IndirectFontRef, space_after: f32) {
        let line_height = size * LEADING;
        for line in wrap_text(&sanitize_for_builtin_font(text), max_chars(size)) {
            if self.y - line_height < MARGIN_PT {
                self.new_page();
            }
            self.y -= line_height;
            self.layer.use_text(
                line,
                size,
                Mm(MARGIN_PT * MM_PER_PT),
                Mm(self.y * MM_PER_PT),
                font,
            );
        }
        self.space(space_after);
    }
}

/// Rough characters-per-line for Helvetica at `size` across the text width.
fn max_chars(size: f32) -> usize {
    ((USABLE_WIDTH_PT / (size * 0.5)) as usize).max(10)
}

/// Greedy word wrap. Whitespace (including newlines) collapses to single
/// spaces; words longer than a line are split.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            let piece_len = piece.len();
            if current_len > 0 && current_len + 1 + piece_len > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Map text onto what the built-in PDF fonts can show (Latin-1).
fn sanitize_for_builtin_font(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{25CF}' | '\u{25E6}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            c if c.is_whitespace() => out.push(' '),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            '\u{A1}'..='\u{FF}' => out.push(c),
            _ => {}
        }
    }
    out
}
