//! Typed REST surface over the transport
//!
//! Maps the backend's conversation/chat endpoints onto domain types.
//! Assistant messages coming off the wire carry the raw model output;
//! loading paths split the reasoning block here so the store only ever
//! holds display-ready messages. The reply to a live send is returned
//! raw ([`RawReply`]) and decoded by the exchange controller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::decoder;
use crate::models::{Conversation, Message, Role, Scope};
use crate::transport::{EventStream, Transport, TransportError};

/// Undecoded assistant reply from `POST /chat/{id}`
#[derive(Debug, Clone)]
pub struct RawReply {
    pub id: String,
    pub content: String,
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One parsed event from the chat push stream
///
/// Wire frames are `{"token": ...}`, `{"sources": [...]}`,
/// `{"error": ...}` and the literal `[DONE]` terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Token(String),
    Sources(Value),
    Error(String),
    Done,
}

impl ChatEvent {
    /// Parse a raw SSE payload; unknown frames are skipped (`None`)
    pub fn parse(payload: &str) -> Option<Self> {
        if payload == "[DONE]" {
            return Some(ChatEvent::Done);
        }
        let value: Value = serde_json::from_str(payload).ok()?;
        if let Some(token) = value.get("token").and_then(Value::as_str) {
            return Some(ChatEvent::Token(token.to_string()));
        }
        if let Some(sources) = value.get("sources") {
            return Some(ChatEvent::Sources(sources.clone()));
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Some(ChatEvent::Error(error.to_string()));
        }
        tracing::debug!("Skipping unrecognized stream frame: {}", payload);
        None
    }
}

/// Render the backend's sources array as a single citation string
///
/// Entries look like `{"document_id": 3, "page_num": 12, ...}`.
pub fn format_sources(sources: &Value) -> Option<String> {
    let entries = sources.as_array()?;
    let mut parts = Vec::new();
    for entry in entries {
        let doc = match entry
            .get("document_title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                entry
                    .get("document_id")
                    .map(|id| format!("doc {}", id_text(id)))
            }) {
            Some(doc) => doc,
            // Entries without any document identity are skipped.
            None => continue,
        };
        match entry.get("page_num").filter(|p| !p.is_null()) {
            Some(page) => parts.push(format!("{} p.{}", doc, id_text(page))),
            None => parts.push(doc),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn id_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(deserialize_with = "crate::models::de_id")]
    id: String,
    role: Role,
    content: String,
    #[serde(default)]
    source_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl WireMessage {
    /// Convert to a display-ready message, splitting any reasoning block
    fn into_message(self) -> Message {
        let (content, reasoning) = match self.role {
            Role::Assistant => {
                let decoded = decoder::decode(&self.content);
                (decoded.visible, decoded.reasoning)
            }
            Role::User => (self.content, None),
        };
        Message {
            id: self.id,
            role: self.role,
            content,
            reasoning,
            source_ref: self.source_ref,
            created_at: self.created_at,
        }
    }
}

/// Client for the conversation/chat endpoints
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn scope_query(scope: &Scope) -> String {
        match &scope.document_id {
            Some(doc) => format!("?scope={}&documentId={}", scope.library_id, doc),
            None => format!("?scope={}", scope.library_id),
        }
    }

    /// List conversations for a scope, most recently created first
    pub async fn list_conversations(
        &self,
        scope: &Scope,
    ) -> Result<Vec<Conversation>, TransportError> {
        let path = format!("/conversations{}", Self::scope_query(scope));
        let value = self.transport.request(Method::GET, &path, None).await?;
        let mut conversations: Vec<Conversation> =
            serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    /// Create a conversation under a scope
    pub async fn create_conversation(
        &self,
        scope: &Scope,
        title: Option<&str>,
    ) -> Result<Conversation, TransportError> {
        let path = format!("/conversations{}", Self::scope_query(scope));
        let body = match title {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        let value = self
            .transport
            .request(Method::POST, &path, Some(body))
            .await?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Rename a conversation; the server returns the updated record
    pub async fn rename_conversation(
        &self,
        id: &str,
        title: &str,
    ) -> Result<Conversation, TransportError> {
        let path = format!("/conversations/{id}");
        let value = self
            .transport
            .request(Method::PUT, &path, Some(json!({ "title": title })))
            .await?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), TransportError> {
        let path = format!("/conversations/{id}");
        self.transport.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// Load a conversation's messages in chronological order
    pub async fn get_messages(&self, id: &str) -> Result<Vec<Message>, TransportError> {
        let path = format!("/conversations/{id}/messages");
        let value = self.transport.request(Method::GET, &path, None).await?;
        let wire: Vec<WireMessage> =
            serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(wire.into_iter().map(WireMessage::into_message).collect())
    }

    /// Submit one user message and await the raw assistant reply
    pub async fn send_chat(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<RawReply, TransportError> {
        let path = format!("/chat/{conversation_id}");
        let value = self
            .transport
            .request(Method::POST, &path, Some(json!({ "content": content })))
            .await?;
        let wire: WireMessage =
            serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(RawReply {
            id: wire.id,
            content: wire.content,
            source_ref: wire.source_ref,
            created_at: wire.created_at,
        })
    }

    /// Open the push stream for one user message
    pub async fn stream_chat(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<EventStream, TransportError> {
        let path = format!("/chat/{conversation_id}/stream");
        self.transport
            .open_stream(&path, &[("content", content.to_string())])
            .await
    }

    /// All conversations across libraries, most recently updated first
    pub async fn list_all_conversations(&self) -> Result<Vec<Conversation>, TransportError> {
        let value = self.transport.request(Method::GET, "/history", None).await?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// One conversation with its full (decoded) transcript
    pub async fn get_conversation(
        &self,
        id: &str,
    ) -> Result<(Conversation, Vec<Message>), TransportError> {
        let path = format!("/history/{id}");
        let value = self.transport.request(Method::GET, &path, None).await?;

        let conversation: Conversation = serde_json::from_value(value.clone())
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let messages = match value.get("messages") {
            Some(messages) => {
                let wire: Vec<WireMessage> = serde_json::from_value(messages.clone())
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
                wire.into_iter().map(WireMessage::into_message).collect()
            }
            None => Vec::new(),
        };
        Ok((conversation, messages))
    }
}
