//! Attachment tokens: how an uploaded file travels as an ordinary chat body.
//!
//! `[[attachment|<contentType>|<url>|<name>|<size>|<durationMs>|<width>|<height>]]`
//!
//! The last three fields may be empty. The real-time path never looks inside.

use serde::{Deserialize, Serialize};

const PREFIX: &str = "[[attachment|";
const SUFFIX: &str = "]]";
const FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub url: String,
    pub original_name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Attachment {
    pub fn encode(&self) -> String {
        let opt = |v: Option<String>| v.unwrap_or_default();
        let fields = [
            escape(&self.content_type),
            escape(&self.url),
            escape(&self.original_name),
            self.size.to_string(),
            opt(self.duration_ms.map(|v| v.to_string())),
            opt(self.width.map(|v| v.to_string())),
            opt(self.height.map(|v| v.to_string())),
        ];

        format!("{PREFIX}{}{SUFFIX}", fields.join("|"))
    }

    /// `None` for anything that is not a well-formed token, free text included.
    pub fn decode(body: &str) -> Option<Attachment> {
        let inner = body.trim().strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        let fields: Vec<&str> = inner.split('|').collect();
        if fields.len() != FIELDS {
            return None;
        }

        let content_type = fields[0].to_owned();
        let url = fields[1].to_owned();
        if content_type.is_empty() || url.is_empty() {
            return None;
        }

        Some(Attachment {
            content_type,
            url,
            original_name: fields[2].to_owned(),
            size: fields[3].parse().ok()?,
            duration_ms: optional(fields[4])?,
            width: optional(fields[5])?,
            height: optional(fields[6])?,
        })
    }
}

fn escape(field: &str) -> String {
    field.replace(['|', '[', ']', '\n', '\r'], "_")
}

// Outer None: malformed number. Inner None: field left empty.
fn optional<T: std::str::FromStr>(field: &str) -> Option<Option<T>> {
    if field.is_empty() {
        return Some(None);
    }
    field.parse().ok().map(Some)
}
