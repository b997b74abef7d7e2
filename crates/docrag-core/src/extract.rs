//! Plain-text extraction for the document types ingest understands.
//!
//! Extraction is best effort: callers log and skip documents that fail.

use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::Html;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Html,
    Docx,
    Pdf,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(Self::Text),
            "html" | "htm" => Some(Self::Html),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

pub fn extract_text(path: &Path) -> Result<String> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| anyhow!("unsupported file type: {}", path.display()))?;
    match kind {
        DocumentKind::Text => read_lossy(path),
        DocumentKind::Html => Ok(html_to_text(&read_lossy(path)?)),
        DocumentKind::Docx => read_docx(path),
        DocumentKind::Pdf => read_pdf(path),
    }
}

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Visible text of an HTML document; `script`, `style` and `noscript` are dropped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        let text: &str = text;
        if !text.trim().is_empty() {
            out.push_str(text);
            out.push('\n');
        }
    }
    out
}

fn read_docx(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).with_context(|| format!("not a docx archive: {}", path.display()))?;
    let mut entry = archive.by_name("word/document.xml").with_context(|| format!("missing word/document.xml in {}", path.display()))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    docx_xml_to_text(&xml)
}

/// Text runs of a WordprocessingML body. Paragraph ends and run breaks
/// become newlines, run tabs become `\t`.
pub fn docx_xml_to_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_run = false;
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => out.push('\n'),
                b"br" | b"cr" if in_run => out.push('\n'),
                b"tab" if in_run => out.push('\t'),
                _ => {}
            },
            Event::Text(e) if in_text => out.push_str(&e.unescape()?),
            Event::CData(e) if in_text => out.push_str(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn read_pdf(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path).with_context(|| format!("not a readable PDF: {}", path.display()))?;
    let pages: Vec<String> = doc
        .get_pages()
        .into_keys()
        .map(|number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                debug!("No text on page {} of {}: {}", number, path.display(), e);
                String::new()
            }
        })
        .collect();
    Ok(pages.join("\n\n"))
}
