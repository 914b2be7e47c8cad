//! Text extraction from source files.
//!
//! The format is chosen from the file name: `.pdf` goes through
//! `pdf-extract`, `.docx` through its `word/document.xml` part, and
//! anything else is read as UTF-8 text. Extracted text is then split into
//! fragments by [`crate::chunk::split_fragments`].

use std::io::Read;
use std::panic;
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

use crate::chunk::split_fragments;

/// Maximum decompressed bytes read from the DOCX body part (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("no extractable text")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    PlainText,
}

impl Format {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Format::Pdf,
            "docx" => Format::Docx,
            _ => Format::PlainText,
        }
    }
}

/// Extract text from `bytes` and split it into fragments.
///
/// Fails with [`ExtractError::Empty`] when nothing but whitespace comes out.
pub fn extract_fragments(
    bytes: &[u8],
    format: Format,
    max_tokens: usize,
) -> Result<Vec<String>, ExtractError> {
    let text = extract_text(bytes, format)?;
    let fragments = split_fragments(&text, max_tokens);
    if fragments.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(fragments)
}

pub fn extract_text(bytes: &[u8], format: Format) -> Result<String, ExtractError> {
    match format {
        Format::Pdf => extract_pdf(bytes),
        Format::Docx => extract_docx(bytes),
        Format::PlainText => Ok(std::str::from_utf8(bytes)?.to_string()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed documents instead of erroring.
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(format!("word/document.xml: {}", e)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_body_text(&xml)
}

/// Collects `w:t` runs; each `w:p` ends a paragraph.
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"br" => out.push('\n'),
                b"tab" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(Format::for_path(Path::new("/a/b.pdf")), Format::Pdf);
        assert_eq!(Format::for_path(Path::new("/a/B.PDF")), Format::Pdf);
        assert_eq!(Format::for_path(Path::new("notes.docx")), Format::Docx);
        assert_eq!(Format::for_path(Path::new("notes.md")), Format::PlainText);
        assert_eq!(Format::for_path(Path::new("README")), Format::PlainText);
    }

    #[test]
    fn test_plain_text_fragments() {
        let fragments =
            extract_fragments(b"Scrum basics.\n\nSprints last two weeks.", Format::PlainText, 500)
                .unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Scrum basics."));
    }

    #[test]
    fn test_invalid_utf8_is_error() {
        let err = extract_fragments(&[0xff, 0xfe, 0x00], Format::PlainText, 500).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn test_blank_text_is_empty_error() {
        let err = extract_fragments(b"   \n\n  ", Format::PlainText, 500).unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[test]
    fn test_garbage_pdf_is_error() {
        let err = extract_fragments(b"definitely not a pdf", Format::Pdf, 500).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_docx_paragraphs() {
        let bytes = docx_with_paragraphs(&["Sprint planning", "Daily stand-up &amp; review"]);
        let text = extract_text(&bytes, Format::Docx).unwrap();
        assert!(text.contains("Sprint planning\n\n"));
        assert!(text.contains("Daily stand-up & review"));

        let fragments = extract_fragments(&bytes, Format::Docx, 3).unwrap();
        assert!(fragments.len() >= 2);
    }

    #[test]
    fn test_docx_without_body_is_error() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_text(&cursor.into_inner(), Format::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }
}
