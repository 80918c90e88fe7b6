//! Session lifecycle - scope selection, resume, rename, delete
//!
//! State machine driving what the chat view shows:
//!
//! `Idle` -> `Listing` -> `NoActiveConversation` -> `PendingResume` -> `Active`
//!
//! Picking a conversation from history never loads it eagerly; the user
//! confirms the resume first (loading a long history is costly and the
//! pick may be a misclick). Read fetches are tagged with a generation
//! counter so a stale completion can never overwrite a newer one.

use thiserror::Error;

use crate::api::ApiClient;
use crate::models::{Conversation, Message, Scope};
use crate::store::ConversationStore;
use crate::transport::TransportError;

/// Greeting seeded client-side on every fresh chat; never persisted.
pub const GREETING: &str = "Hi! Ask me anything about the documents in this library.";

/// Lifecycle state of the chat view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No scope selected yet
    Idle,
    /// Scope selected, fetching known conversations
    Listing,
    /// Fresh chat, greeting shown, input enabled
    NoActiveConversation,
    /// A history entry is selected but its messages are not loaded
    PendingResume,
    /// Messages loaded, input enabled
    Active,
}

/// Session-level failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// No library scope selected; prevented client-side, never sent
    #[error("No library selected")]
    NoScope,

    /// No conversation is pending resume
    #[error("No conversation selected")]
    NothingSelected,

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Title is unchanged")]
    TitleUnchanged,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Controller for conversation lifecycle within one chat view
pub struct SessionController {
    api: ApiClient,
    store: ConversationStore,
    scope: Option<Scope>,
    state: SessionState,
    /// Tags known-conversations fetches; last initiated wins. Today the
    /// `&mut self` borrow already serializes fetches; the tag keeps
    /// last-write-wins intact if the controller is ever driven through a
    /// shared handle, and lets `teardown` invalidate in-flight reads.
    list_generation: u64,
    /// Tags message-load fetches; last initiated wins (see above).
    load_generation: u64,
}

impl SessionController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            store: ConversationStore::new(),
            scope: None,
            state: SessionState::Idle,
            list_generation: 0,
            load_generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Select a library (optionally narrowed to one document) and fetch
    /// its conversations
    ///
    /// On failure the previous state and scope are kept so the action can
    /// simply be retried.
    pub async fn select_scope(&mut self, scope: Scope) -> Result<(), SessionError> {
        let previous = self.state;
        self.state = SessionState::Listing;

        self.list_generation += 1;
        let generation = self.list_generation;
        let result = self.api.list_conversations(&scope).await;

        if generation != self.list_generation {
            tracing::debug!("Dropping stale conversation list for scope {}", scope.library_id);
            return Ok(());
        }

        match result {
            Ok(conversations) => {
                self.scope = Some(scope);
                self.store.replace_known(conversations);
                self.start_new_chat();
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                Err(e.into())
            }
        }
    }

    /// Clear the active conversation and seed the greeting
    ///
    /// Usable from any state once a scope is selected; without a scope it
    /// is a no-op.
    pub fn start_new_chat(&mut self) {
        if self.scope.is_none() {
            tracing::debug!("start_new_chat ignored: no scope selected");
            return;
        }
        self.store.set_active(None);
        self.store.append_message(Message::synthetic_assistant(GREETING));
        self.state = SessionState::NoActiveConversation;
    }

    /// Record a history pick as active-but-unloaded
    ///
    /// The transcript stays empty until the user confirms the resume.
    pub fn pick_from_history(&mut self, conversation: Conversation) {
        self.store.set_active(Some(conversation));
        self.state = SessionState::PendingResume;
    }

    /// Load the picked conversation's messages
    ///
    /// Failure keeps the state at `PendingResume` so the selection
    /// survives and the user can retry.
    pub async fn confirm_resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::PendingResume {
            return Err(SessionError::NothingSelected);
        }
        let conversation_id = match self.store.active() {
            Some(active) => active.id.clone(),
            None => return Err(SessionError::NothingSelected),
        };

        self.load_generation += 1;
        let generation = self.load_generation;
        let result = self.api.get_messages(&conversation_id).await;

        if generation != self.load_generation {
            tracing::debug!("Dropping stale message load for {}", conversation_id);
            return Ok(());
        }

        let messages = result?;
        // The pick may have changed while the load was in flight.
        if self.store.active().map(|c| c.id.as_str()) == Some(conversation_id.as_str()) {
            self.store.set_messages(messages);
            self.state = SessionState::Active;
        } else {
            tracing::warn!("Loaded messages for {} but it is no longer active", conversation_id);
        }
        Ok(())
    }

    /// Rename a conversation; not optimistic
    ///
    /// Requires a non-empty title different from the current one; neither
    /// case touches the network. The known list is re-fetched afterwards
    /// to stay authoritative.
    pub async fn rename(&mut self, id: &str, title: &str) -> Result<(), SessionError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::EmptyTitle);
        }

        let current = self
            .store
            .known()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.title.clone())
            .or_else(|| {
                self.store
                    .active()
                    .filter(|c| c.id == id)
                    .and_then(|c| c.title.clone())
            });
        if current.as_deref() == Some(title) {
            return Err(SessionError::TitleUnchanged);
        }

        self.api.rename_conversation(id, title).await?;

        if self.store.active().map(|c| c.id.as_str()) == Some(id) {
            self.store.set_active_title(title);
        }
        if let Err(e) = self.refresh_conversations().await {
            tracing::warn!("Re-list after rename failed, patching locally: {e}");
            self.store.patch_known_title(id, title);
        }
        Ok(())
    }

    /// Delete a conversation
    ///
    /// Deleting the active conversation falls back to a fresh chat so no
    /// dangling reference to the deleted entity remains.
    pub async fn delete(&mut self, id: &str) -> Result<(), SessionError> {
        self.api.delete_conversation(id).await?;

        if self.store.active().map(|c| c.id.as_str()) == Some(id) {
            self.start_new_chat();
        }
        if let Err(e) = self.refresh_conversations().await {
            tracing::warn!("Re-list after delete failed, patching locally: {e}");
            self.store.remove_known(id);
        }
        Ok(())
    }

    /// Re-fetch the known-conversations list for the current scope
    pub async fn refresh_conversations(&mut self) -> Result<(), SessionError> {
        let Some(scope) = self.scope.clone() else {
            return Ok(());
        };

        self.list_generation += 1;
        let generation = self.list_generation;
        let result = self.api.list_conversations(&scope).await;

        if generation != self.list_generation {
            tracing::debug!("Dropping stale conversation list refresh");
            return Ok(());
        }
        self.store.replace_known(result?);
        Ok(())
    }

    /// Adopt a conversation created implicitly by the first send
    pub(crate) fn adopt_created(&mut self, conversation: Conversation) {
        self.store.adopt_active(conversation);
        self.state = SessionState::Active;
    }

    /// Tear down the view: in-flight read completions are ignored
    ///
    /// Returns to a genuinely scopeless `Idle`, so post-teardown actions
    /// that require a scope are no-ops. Any open chat stream is cancelled
    /// separately by dropping the exchange controller's stream handle.
    pub fn teardown(&mut self) {
        self.list_generation += 1;
        self.load_generation += 1;
        self.scope = None;
        self.state = SessionState::Idle;
    }
}
