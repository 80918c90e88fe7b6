//! Wire and domain types shared with the BookBot backend
//!
//! Everything here deserializes directly from the backend's JSON. The
//! backend uses numeric ids; we normalize them to strings so that
//! client-generated optimistic ids (UUIDs) and server ids share one type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Message author role
///
/// Closed set: anything other than `user` / `assistant` is a
/// deserialization error, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Ingestion status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

/// A user-owned collection of documents and conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A processed artifact (uploaded file or ingested web page) in a library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    /// Source filename for uploads, URL for web ingests
    pub source: String,
    #[serde(default)]
    pub size_bytes: u64,
    /// Null until processing completes
    #[serde(default)]
    pub page_count: Option<u32>,
    pub status: IngestStatus,
    #[serde(default)]
    pub is_web: bool,
    pub created_at: DateTime<Utc>,
}

/// A chat thread scoped to a library or to one document within it
///
/// The scope is fixed at creation and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "de_id")]
    pub library_id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub document_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One turn in a conversation
///
/// `content` holds the visible answer text; a reasoning block embedded in
/// the raw server value is split off into `reasoning` during decoding.
/// Messages are append-only: never edited or reordered after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build an optimistic user message with a client-generated id
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            reasoning: None,
            source_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Build a synthetic assistant message (greeting, apology)
    ///
    /// Synthetic messages are client-local and never persisted server-side.
    pub fn synthetic_assistant(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            reasoning: None,
            source_ref: None,
            created_at: Utc::now(),
        }
    }
}

/// The scope a conversation is created under: a library, optionally
/// narrowed to a single document
///
/// `label` is a display name used to derive titles for implicitly created
/// conversations (document title when narrowed, library name otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub library_id: String,
    pub document_id: Option<String>,
    pub label: Option<String>,
}

impl Scope {
    /// Scope covering a whole library
    pub fn library(library_id: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            document_id: None,
            label: None,
        }
    }

    /// Scope narrowed to one document inside a library
    pub fn document(library_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            document_id: Some(document_id.into()),
            label: None,
        }
    }

    /// Attach a display label used for derived conversation titles
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Accept both numeric and string ids from the wire
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }

    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }

    Ok(Option::<IdRepr>::deserialize(deserializer)?.map(|id| match id {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_rejects_unknown_values() {
        assert!(serde_json::from_str::<Role>("\"user\"").is_ok());
        assert!(serde_json::from_str::<Role>("\"assistant\"").is_ok());
        assert!(serde_json::from_str::<Role>("\"system\"").is_err());
        assert!(serde_json::from_str::<Role>("\"tool\"").is_err());
    }

    #[test]
    fn test_numeric_ids_normalized_to_strings() {
        let json = r#"{
            "id": 42,
            "title": "Chapter questions",
            "library_id": 7,
            "document_id": 3,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": null
        }"#;
        let conv: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conv.id, "42");
        assert_eq!(conv.library_id, "7");
        assert_eq!(conv.document_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_message_deserializes_without_optional_fields() {
        let json = r#"{
            "id": 1,
            "role": "assistant",
            "content": "Chapter 2 covers X.",
            "created_at": "2024-05-01T12:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.reasoning.is_none());
        assert!(msg.source_ref.is_none());
    }

    #[test]
    fn test_ingest_status_lowercase() {
        let status: IngestStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(status, IngestStatus::Processing);
        assert_eq!(
            serde_json::to_string(&IngestStatus::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn test_synthetic_messages_get_unique_ids() {
        let a = Message::synthetic_assistant("hi");
        let b = Message::synthetic_assistant("hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, Role::Assistant);
    }
}
