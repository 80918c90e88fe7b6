//! In-memory state for the active chat view
//!
//! One store per chat view, owned by the session controller and mutated
//! only in reaction to user actions and network completions. Holds the
//! active conversation, its transcript, and the known conversations for
//! the current scope.

use crate::models::{Conversation, Message};

/// Conversation state observed by the UI
#[derive(Debug, Default)]
pub struct ConversationStore {
    active: Option<Conversation>,
    messages: Vec<Message>,
    known: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    /// Transcript of the active conversation, in append order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Known conversations for the current scope, newest first
    pub fn known(&self) -> &[Conversation] {
        &self.known
    }

    /// Replace the active conversation
    ///
    /// Always clears the transcript; the caller repopulates it lazily
    /// (resume flow) or by appending fresh messages.
    pub fn set_active(&mut self, conversation: Option<Conversation>) {
        self.active = conversation;
        self.messages.clear();
    }

    /// Adopt a conversation created implicitly by the first send
    ///
    /// Unlike [`ConversationStore::set_active`] this keeps the transcript,
    /// which already holds the optimistically appended user message.
    pub fn adopt_active(&mut self, conversation: Conversation) {
        self.active = Some(conversation);
    }

    /// Update the active conversation's title after a confirmed rename
    pub fn set_active_title(&mut self, title: &str) {
        if let Some(active) = self.active.as_mut() {
            active.title = Some(title.to_string());
        }
    }

    /// Append a message to the transcript
    ///
    /// Duplicate ids are dropped to guard against double delivery from
    /// retried sends. Returns whether the message was appended.
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            tracing::warn!("Dropping duplicate message {}", message.id);
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace the transcript wholesale (resume load)
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Replace the known-conversations list from the server
    ///
    /// Full replacement keeps the list authoritative instead of patching
    /// it incrementally and drifting. Sorted newest-created first.
    pub fn replace_known(&mut self, mut conversations: Vec<Conversation>) {
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.known = conversations;
    }

    /// Patch one known entry in place (fallback when a re-list fails)
    pub(crate) fn patch_known_title(&mut self, id: &str, title: &str) {
        if let Some(entry) = self.known.iter_mut().find(|c| c.id == id) {
            entry.title = Some(title.to_string());
        }
    }

    /// Drop one known entry in place (fallback when a re-list fails)
    pub(crate) fn remove_known(&mut self, id: &str) {
        self.known.retain(|c| c.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn conv(id: &str, created_offset_min: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: Some(format!("conv {id}")),
            library_id: "L1".to_string(),
            document_id: None,
            created_at: Utc::now() + Duration::minutes(created_offset_min),
            updated_at: None,
        }
    }

    #[test]
    fn test_set_active_clears_messages() {
        let mut store = ConversationStore::new();
        store.append_message(Message::user("hello"));
        assert_eq!(store.messages().len(), 1);

        store.set_active(Some(conv("C1", 0)));
        assert!(store.messages().is_empty());
        assert_eq!(store.active().unwrap().id, "C1");

        store.append_message(Message::user("again"));
        store.set_active(None);
        assert!(store.messages().is_empty());
        assert!(store.active().is_none());
    }

    #[test]
    fn test_adopt_active_keeps_messages() {
        let mut store = ConversationStore::new();
        store.append_message(Message::user("first message"));
        store.adopt_active(conv("C1", 0));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.active().unwrap().id, "C1");
    }

    #[test]
    fn test_duplicate_append_is_dropped() {
        let mut store = ConversationStore::new();
        let msg = Message::user("hello");
        assert!(store.append_message(msg.clone()));
        assert!(!store.append_message(msg));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::new();
        store.append_message(Message::user("one"));
        store.append_message(Message::user("two"));
        store.append_message(Message::user("three"));
        let contents: Vec<_> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_replace_known_sorts_newest_first() {
        let mut store = ConversationStore::new();
        store.replace_known(vec![conv("old", -10), conv("new", 0), conv("mid", -5)]);
        let ids: Vec<_> = store.known().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_known_fallback_patches() {
        let mut store = ConversationStore::new();
        store.replace_known(vec![conv("C1", 0), conv("C2", -1)]);

        store.patch_known_title("C2", "renamed");
        assert_eq!(
            store.known()[1].title.as_deref(),
            Some("renamed")
        );

        store.remove_known("C1");
        let ids: Vec<_> = store.known().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C2"]);
    }
}
