// Wire model shared by the HTTP transport, the controller and the CLI

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a narrated document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BookId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPosition {
    pub title: String,
    pub page_number: u32,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub id: BookId,
    pub reference_string: String,
    pub total_pages: u32,
    #[serde(default)]
    pub table_of_contents: BTreeMap<String, ChapterPosition>,
}

/// Last-read cursor for a book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingPosition {
    pub page: u32,
    pub paragraph: u32,
    pub sentence: u32,
    pub timestamp: f64,
}

impl Default for ReadingPosition {
    fn default() -> Self {
        // Books without saved state start on the first page
        Self {
            page: 1,
            paragraph: 0,
            sentence: 0,
            timestamp: 0.0,
        }
    }
}

/// Body of `POST /api/narration/interrupt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub book_id: BookId,
    pub timestamp: f64,
}

/// Audio bytes returned by the narration service for one timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl AudioPayload {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "audio/mpeg";

    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type
                .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
                .to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension hint for the decoder probe
    pub fn extension_hint(&self) -> Option<&'static str> {
        let essence = self.content_type.split(';').next().unwrap_or("").trim();
        match essence {
            "audio/mpeg" | "audio/mp3" => Some("mp3"),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
            "audio/ogg" | "audio/opus" => Some("ogg"),
            "audio/flac" => Some("flac"),
            "audio/aac" => Some("aac"),
            "audio/mp4" | "audio/m4a" => Some("m4a"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_metadata_from_wire() {
        let json = r#"{
            "reference_string": "moby-dick.pdf",
            "id": "b1",
            "total_pages": 635,
            "table_of_contents": {
                "Loomings": {"title": "Loomings", "page_number": 1, "timestamp": null}
            }
        }"#;
        let book: BookMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(book.id, BookId::new("b1"));
        assert_eq!(book.total_pages, 635);
        assert_eq!(book.table_of_contents["Loomings"].page_number, 1);
        assert_eq!(book.table_of_contents["Loomings"].timestamp, None);
    }

    #[test]
    fn test_interrupt_body_field_names() {
        let body = InterruptRequest {
            book_id: BookId::new("b1"),
            timestamp: 42.3,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, serde_json::json!({"book_id": "b1", "timestamp": 42.3}));
    }

    #[test]
    fn test_extension_hint_ignores_parameters() {
        let payload = AudioPayload::new(vec![1, 2, 3], Some("audio/mpeg; charset=binary"));
        assert_eq!(payload.extension_hint(), Some("mp3"));
        assert_eq!(AudioPayload::new(vec![], None).content_type, "audio/mpeg");
    }
}
