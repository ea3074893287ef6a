//! Text extraction from downloaded attachments

use crate::output::docx::DocxConverter;
use crate::output::traits::{Converter, OutputError, OutputResult};
use scraper::{ElementRef, Html};
use std::path::Path;

/// Elements whose text is never part of the readable page
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "noscript", "template"];

/// Elements that start a new line in the extracted text
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tr", "ul",
];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn unsupported(path: &Path, ext: &str) -> OutputError {
    OutputError::Unsupported(if ext.is_empty() {
        path.display().to_string()
    } else {
        ext.to_string()
    })
}

/// Extracts text from plain-text, markdown and HTML attachments
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

impl TextConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for TextConverter {
    fn convert(&self, path: &Path) -> OutputResult<String> {
        let ext = extension(path);
        match ext.as_str() {
            "txt" | "md" | "markdown" => read_text(path),
            "html" | "htm" => read_text(path).map(|html| html_text(&html)),
            _ => Err(unsupported(path, &ext)),
        }
    }
}

/// Picks a converter by file extension
///
/// Word documents go to [`DocxConverter`], text and HTML to
/// [`TextConverter`]. Legacy `.doc` and PDF files are reported as
/// `Unsupported`; the coordinator then treats the attachment as carrying
/// no text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentConverter {
    docx: DocxConverter,
    text: TextConverter,
}

impl DocumentConverter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Converter for DocumentConverter {
    fn convert(&self, path: &Path) -> OutputResult<String> {
        match extension(path).as_str() {
            "docx" => self.docx.convert(path),
            _ => self.text.convert(path),
        }
    }
}

fn read_text(path: &Path) -> OutputResult<String> {
    let bytes = std::fs::read(path).map_err(|e| OutputError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Visible text of an HTML page, one line per block
fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len());
    collect_text(document.root_element(), &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let name = child.value().name();
        if HIDDEN_ELEMENTS.contains(&name) {
            continue;
        }
        let block = BLOCK_ELEMENTS.contains(&name);
        if block {
            out.push('\n');
        }
        collect_text(child, out);
        if block {
            out.push('\n');
        } else if name == "td" || name == "th" {
            out.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notice.TXT");
        std::fs::write(&path, "  Article 1\nArticle 2\n").unwrap();
        assert_eq!(TextConverter.convert(&path).unwrap(), "Article 1\nArticle 2");
    }

    #[test]
    fn test_html_is_stripped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html><body><h1>Title</h1><p>A &amp; B</p></body></html>").unwrap();
        assert_eq!(TextConverter.convert(&path).unwrap(), "Title\nA & B");
    }

    #[test]
    fn test_html_skips_scripts_and_keeps_inline_text_together() {
        let html = r#"<html><head><title>Notice</title><style>p { color: red }</style></head>
<body><script>var x = "<p>hidden</p>";</script>
<p>Article <b>one</b>   applies&nbsp;to &#8220;all&#8221; cities.</p>
<div>Line 1<br>Line 2</div></body></html>"#;

        assert_eq!(
            html_text(html),
            "Article one applies to \u{201c}all\u{201d} cities.\nLine 1\nLine 2"
        );
    }

    #[test]
    fn test_html_table_cells_share_a_line() {
        let html = "<table><tr><th>Item</th><th>Fee</th></tr><tr><td>Permit</td><td>10</td></tr></table>";
        assert_eq!(html_text(html), "Item Fee\nPermit 10");
    }

    #[test]
    fn test_html_with_comparison_text() {
        // stray angle brackets in text are not markup
        assert_eq!(html_text("<p>1 &lt; 2 and 3 > 2</p>"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn test_binary_formats_unsupported() {
        let err = TextConverter.convert(Path::new("/tmp/x.docx")).unwrap_err();
        assert!(matches!(err, OutputError::Unsupported(ref ext) if ext == "docx"));

        let err = DocumentConverter::new().convert(Path::new("/tmp/x.pdf")).unwrap_err();
        assert!(matches!(err, OutputError::Unsupported(ref ext) if ext == "pdf"));
        let err = DocumentConverter::new().convert(Path::new("/tmp/x.doc")).unwrap_err();
        assert!(matches!(err, OutputError::Unsupported(ref ext) if ext == "doc"));
    }

    #[test]
    fn test_document_converter_dispatches_by_extension() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("a.txt");
        std::fs::write(&text, "plain").unwrap();
        assert_eq!(DocumentConverter::new().convert(&text).unwrap(), "plain");

        // a docx that is not a zip reaches the docx reader
        let docx = dir.path().join("b.DOCX");
        std::fs::write(&docx, "plain").unwrap();
        let err = DocumentConverter::new().convert(&docx).unwrap_err();
        assert!(matches!(err, OutputError::Extraction { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TextConverter.convert(Path::new("/nonexistent/a.txt")).unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
        assert!(!err.is_fatal());
    }
}
