//! MIME parsing and attachment extraction.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::error::{BridgeError, Result};

use super::types::Attachment;

/// Header fields of a parsed message the engine cares about.
#[derive(Debug)]
pub struct ParsedMail {
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

/// Parse a raw RFC 5322 message and pull out every part flagged as an
/// attachment, in declared order.
pub fn extract_attachments(raw: &[u8]) -> Result<ParsedMail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| BridgeError::Parse("failed to parse mail message".to_string()))?;

    let subject = message.subject().unwrap_or_default().to_string();
    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    let mut attachments = Vec::new();
    for part in message.parts.iter() {
        if !is_attachment(part) {
            continue;
        }

        let content = match &part.body {
            PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
            PartType::Text(text) => text.as_bytes().to_vec(),
            PartType::Html(html) => html.as_bytes().to_vec(),
            _ => continue,
        };

        let filename = attachment_filename(part, attachments.len());
        debug!("Found attachment '{}' ({} bytes)", filename, content.len());

        attachments.push(Attachment::new(filename, Bytes::from(content)));
    }

    Ok(ParsedMail {
        subject,
        date,
        attachments,
    })
}

fn is_attachment(part: &mail_parser::MessagePart) -> bool {
    if let Some(disposition) = part.content_disposition() {
        if disposition.ctype() == "attachment" {
            return true;
        }
    }

    // Inline parts that still carry a filename count as attachments.
    if part.attachment_name().is_some() {
        return true;
    }

    // Non-text, non-container parts without an explicit disposition.
    if let Some(content_type) = part.content_type() {
        let ctype = content_type.ctype();
        if ctype != "text" && ctype != "multipart" && ctype != "message" {
            return content_type.subtype().is_some();
        }
    }

    false
}

fn attachment_filename(part: &mail_parser::MessagePart, index: usize) -> String {
    let raw = part
        .attachment_name()
        .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
        .map(|s| s.to_string());

    match raw {
        Some(name) if !name.trim().is_empty() => sanitize_filename(&name),
        _ => format!("attachment-{}", index + 1),
    }
}

/// Strip path traversal and characters that remote stores commonly reject.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = filename.replace("..", "");
    cleaned
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
