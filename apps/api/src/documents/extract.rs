//! Plain-text extraction from uploaded source documents.
//!
//! PDF → `pdf-extract`, DOCX → the `w:t` runs of `word/document.xml`,
//! anything else → lossy UTF-8.

use std::io::{Cursor, Read};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::models::document::DocumentMeta;

const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX text extraction failed: {0}")]
    Docx(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Pdf,
    Docx,
    Text,
}

fn detect_format(meta: &DocumentMeta) -> SourceFormat {
    let content_type = meta.content_type.to_ascii_lowercase();
    let file_name = meta.file_name.to_ascii_lowercase();
    if content_type == PDF_MIME || file_name.ends_with(".pdf") {
        SourceFormat::Pdf
    } else if content_type == DOCX_MIME || file_name.ends_with(".docx") {
        SourceFormat::Docx
    } else {
        SourceFormat::Text
    }
}

/// Extracts the text of a stored document. Blocking; call from `spawn_blocking`
/// for large inputs.
pub fn extract_text(meta: &DocumentMeta, content: &[u8]) -> Result<String, ExtractError> {
    if content.is_empty() {
        return Ok(String::new());
    }
    match detect_format(meta) {
        SourceFormat::Pdf => {
            pdf_extract::extract_text_from_mem(content).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        SourceFormat::Docx => extract_docx_text(content),
        SourceFormat::Text => Ok(String::from_utf8_lossy(content).into_owned()),
    }
}

fn extract_docx_text(content: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| ExtractError::Docx(format!("Failed to open DOCX: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(format!("Failed to find document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(format!("Failed to read document.xml: {e}")))?;

    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => in_text_element = true,
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => {
                let decoded = e
                    .decode()
                    .map_err(|e| ExtractError::Docx(format!("Invalid text run: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::GeneralRef(e)) if in_text_element => push_reference(&mut text, &e)?,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(format!("XML parsing error: {e}"))),
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

/// Appends the text an entity or character reference inside a run stands for.
/// Unknown named entities are kept verbatim.
fn push_reference(text: &mut String, reference: &BytesRef<'_>) -> Result<(), ExtractError> {
    let resolved = reference
        .resolve_char_ref()
        .map_err(|e| ExtractError::Docx(format!("Invalid character reference: {e}")))?;
    if let Some(ch) = resolved {
        text.push(ch);
        return Ok(());
    }

    let name = reference
        .decode()
        .map_err(|e| ExtractError::Docx(format!("Invalid entity reference: {e}")))?;
    match resolve_predefined_entity(&name) {
        Some(value) => text.push_str(value),
        None => {
            text.push('&');
            text.push_str(&name);
            text.push(';');
        }
    }
    Ok(())
}
