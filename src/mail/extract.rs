use std::panic::{self, AssertUnwindSafe};

use anyhow::{Result, anyhow};
use log::warn;

use crate::domain::email::{AttachmentSummary, ExtractionResult, Message, PayloadNode};
use crate::mail::Mailbox;
use crate::mail::decoders::{decode_base64url, decode_mime_words, html_to_text, looks_like_html, normalize_newlines};

pub const NO_CONTENT: &str = "(no content)";
pub const BODY_DECODE_ERROR: &str = "(unable to decode message body)";
pub const ATTACHMENT_FETCH_ERROR: &str = "(error fetching attachment)";

const TEXT_EXTENSIONS: [&str; 5] = [".txt", ".csv", ".json", ".md", ".log"];

/// Depth-first, left-to-right walk over a forest of MIME parts.
pub struct PreOrder<'a> {
    stack: Vec<&'a PayloadNode>,
}

impl<'a> PreOrder<'a> {
    pub fn new(roots: &'a [PayloadNode]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a PayloadNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}

/// Subject and sender; the last occurrence of a repeated header wins.
pub fn parse_headers(payload: &PayloadNode) -> (String, String) {
    let mut subject = String::new();
    let mut sender = String::new();

    for header in &payload.headers {
        if header.name.eq_ignore_ascii_case("Subject") {
            subject = decode_mime_words(&header.value);
        } else if header.name.eq_ignore_ascii_case("From") {
            sender = decode_mime_words(&header.value);
        }
    }

    (subject, sender)
}

fn inline_text_body(part: &PayloadNode) -> Option<(&str, &str)> {
    match part.mime_type() {
        mime @ ("text/plain" | "text/html") => part.inline_data().map(|data| (data, mime)),
        _ => None,
    }
}

pub fn extract_body(payload: &PayloadNode) -> String {
    let source = match &payload.parts {
        Some(parts) => PreOrder::new(parts).find_map(inline_text_body),
        None => payload.inline_data().map(|data| (data, payload.mime_type())),
    };

    let Some((data, mime_type)) = source else {
        return NO_CONTENT.to_string();
    };

    let bytes = match decode_base64url(data) {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to decode message body: {e:#}");
            return BODY_DECODE_ERROR.to_string();
        }
    };
    let text = String::from_utf8_lossy(&bytes);

    let is_html = match mime_type {
        "text/html" => true,
        "" => looks_like_html(&text),
        _ => false,
    };
    let visible = if is_html {
        html_to_text(&text).unwrap_or_else(|e| {
            warn!("falling back to raw body text: {e:#}");
            text.into_owned()
        })
    } else {
        text.into_owned()
    };

    normalize_newlines(&visible)
}

fn is_pdf(filename: &str, mime_type: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf") || mime_type == "application/pdf"
}

fn is_text(filename: &str, mime_type: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    mime_type.starts_with("text/") || TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn pdf_text(bytes: &[u8]) -> Result<String> {
    // the parser can panic on malformed documents
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "parser panicked".to_string());
        anyhow!(msg)
    })?
    .map_err(|e| anyhow!(e.to_string()))?;

    Ok(pages.join("\n").trim().to_string())
}

/// Readable rendering of one attachment's bytes.
pub fn describe_attachment(filename: &str, mime_type: &str, bytes: &[u8]) -> String {
    if is_pdf(filename, mime_type) {
        match pdf_text(bytes) {
            Ok(text) => format!("PDF Content:\n{text}"),
            Err(e) => {
                warn!("failed to parse pdf {filename}: {e:#}");
                format!("(PDF parsing error: {e})")
            }
        }
    } else if is_text(filename, mime_type) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("(binary attachment, {} bytes)", bytes.len())
    }
}

pub fn summarize_attachments<M: Mailbox + ?Sized>(mailbox: &M, message: &Message) -> Vec<AttachmentSummary> {
    PreOrder::new(message.payload.children())
        .filter(|part| !part.filename().is_empty())
        .filter_map(|part| part.attachment_id().map(|id| (part, id)))
        .map(|(part, attachment_id)| {
            let content = match mailbox.get_attachment(&message.id, attachment_id) {
                Some(bytes) => describe_attachment(part.filename(), part.mime_type(), &bytes),
                None => ATTACHMENT_FETCH_ERROR.to_string(),
            };
            AttachmentSummary {
                filename: part.filename().to_string(),
                mime_type: part.mime_type().to_string(),
                content,
            }
        })
        .collect()
}

/// All attachment blocks separated by blank lines; empty when there are none.
pub fn render_attachments(summaries: &[AttachmentSummary]) -> String {
    summaries
        .iter()
        .map(AttachmentSummary::to_block)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub fn extract_attachments_summary<M: Mailbox + ?Sized>(mailbox: &M, message: &Message) -> String {
    render_attachments(&summarize_attachments(mailbox, message))
}

pub fn extract<M: Mailbox + ?Sized>(mailbox: &M, message: &Message) -> ExtractionResult {
    let (subject, sender) = parse_headers(&message.payload);
    ExtractionResult {
        subject,
        sender,
        body: extract_body(&message.payload),
        attachments: summarize_attachments(mailbox, message),
    }
}
