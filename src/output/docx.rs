//! Markdown extraction from Word (.docx) attachments
//!
//! A .docx file is a zip archive; the body lives in `word/document.xml`.
//! Paragraphs become lines, `Heading N` paragraph styles become `#` headings,
//! bold and italic runs keep their emphasis, and tables are rendered as
//! markdown tables after their position in the text.

use crate::output::traits::{Converter, OutputError, OutputResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

const DOCUMENT_ENTRY: &str = "word/document.xml";

/// Converts .docx attachments to markdown
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl DocxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for DocxConverter {
    fn convert(&self, path: &Path) -> OutputResult<String> {
        let xml = read_document_xml(path)?;
        let markdown = docx_markdown(&xml).map_err(|reason| OutputError::extraction(path, reason))?;

        tracing::debug!(
            path = %path.display(),
            chars = markdown.chars().count(),
            "Converted docx"
        );
        Ok(markdown)
    }
}

fn read_document_xml(path: &Path) -> OutputResult<String> {
    let file = std::fs::File::open(path).map_err(|e| OutputError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| OutputError::extraction(path, format!("failed to read zip archive: {}", e)))?;
    let mut entry = archive
        .by_name(DOCUMENT_ENTRY)
        .map_err(|e| OutputError::extraction(path, format!("{}: {}", DOCUMENT_ENTRY, e)))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| OutputError::extraction(path, format!("{}: {}", DOCUMENT_ENTRY, e)))?;
    Ok(xml)
}

/// Renders the body of `word/document.xml` as markdown
pub(crate) fn docx_markdown(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut builder = MarkdownBuilder::default();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => builder.open(&e),
            Event::Empty(e) => {
                builder.open(&e);
                builder.close(e.name().as_ref());
            }
            Event::End(e) => builder.close(e.name().as_ref()),
            Event::Text(t) if builder.in_text => {
                builder.text(&t.unescape().map_err(|e| e.to_string())?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(builder.finish())
}

#[derive(Default)]
struct Run {
    text: String,
    bold: bool,
    italic: bool,
}

impl Run {
    fn render(self) -> String {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return self.text;
        }
        match (self.bold, self.italic) {
            (true, true) => format!("***{}***", trimmed),
            (true, false) => format!("**{}**", trimmed),
            (false, true) => format!("*{}*", trimmed),
            (false, false) => self.text,
        }
    }
}

#[derive(Default)]
struct MarkdownBuilder {
    lines: Vec<String>,
    paragraph: String,
    heading: Option<usize>,
    run: Option<Run>,
    in_text: bool,
    table_depth: usize,
    table: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

impl MarkdownBuilder {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.name().as_ref() {
            b"w:p" => {
                self.paragraph.clear();
                self.heading = None;
            }
            b"w:pStyle" => self.heading = val(e).as_deref().and_then(heading_level),
            b"w:r" => self.run = Some(Run::default()),
            b"w:b" => {
                if let Some(run) = self.run.as_mut() {
                    run.bold = is_on(e);
                }
            }
            b"w:i" => {
                if let Some(run) = self.run.as_mut() {
                    run.italic = is_on(e);
                }
            }
            b"w:t" => self.in_text = true,
            b"w:tab" => self.text("\t"),
            b"w:br" | b"w:cr" => self.text("\n"),
            b"w:tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.table.clear();
                }
            }
            b"w:tr" if self.table_depth == 1 => self.row.clear(),
            b"w:tc" if self.table_depth == 1 => self.cell.clear(),
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"w:t" => self.in_text = false,
            b"w:r" => {
                if let Some(run) = self.run.take() {
                    let rendered = run.render();
                    self.paragraph.push_str(&rendered);
                }
            }
            b"w:p" => self.end_paragraph(),
            b"w:tc" if self.table_depth == 1 => {
                let cell = std::mem::take(&mut self.cell);
                self.row.push(cell.trim().to_string());
            }
            b"w:tr" if self.table_depth == 1 => {
                let row = std::mem::take(&mut self.row);
                self.table.push(row);
            }
            b"w:tbl" => {
                self.table_depth = self.table_depth.saturating_sub(1);
                if self.table_depth == 0 {
                    let table = std::mem::take(&mut self.table);
                    self.lines.push(String::new());
                    self.lines.push(render_table(&table));
                    self.lines.push(String::new());
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        match self.run.as_mut() {
            Some(run) => run.text.push_str(text),
            None => self.paragraph.push_str(text),
        }
    }

    fn end_paragraph(&mut self) {
        let text = std::mem::take(&mut self.paragraph);
        let text = text.trim();

        if self.table_depth > 0 {
            if !text.is_empty() {
                if !self.cell.is_empty() {
                    self.cell.push(' ');
                }
                self.cell.push_str(&text.replace('\n', " "));
            }
            return;
        }

        match self.heading.take() {
            Some(level) if !text.is_empty() => {
                self.lines.push(format!("{} {}", "#".repeat(level), text));
            }
            _ => self.lines.push(text.to_string()),
        }
    }

    /// Joins the lines, keeping at most one blank line between blocks
    fn finish(self) -> String {
        let mut out: Vec<&str> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if line.is_empty() && out.last().map_or(true, |last| last.is_empty()) {
                continue;
            }
            out.push(line);
        }
        out.join("\n").trim().to_string()
    }
}

fn render_table(rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            lines.push(format!("| {} |", vec!["---"; row.len()].join(" | ")));
        }
    }
    lines.join("\n")
}

fn val(e: &BytesStart<'_>) -> Option<String> {
    let attr = e.try_get_attribute("w:val").ok().flatten()?;
    attr.unescape_value().ok().map(|v| v.into_owned())
}

/// `<w:b/>` switches bold on; `w:val="0"` or `"false"` switches it off
fn is_on(e: &BytesStart<'_>) -> bool {
    !matches!(val(e).as_deref(), Some("0") | Some("false") | Some("off"))
}

/// Heading level of a paragraph style id such as `Heading2` or `heading 2`
fn heading_level(style: &str) -> Option<usize> {
    let lower = style.to_ascii_lowercase();
    let level = lower.strip_prefix("heading")?.trim().parse::<usize>().ok()?;
    (1..=6).contains(&level).then_some(level)
}
