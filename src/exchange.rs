//! Message exchange - optimistic send, reply reconciliation, streaming
//!
//! Sends one user message at a time: the message is appended to the
//! store before any network round trip, the assistant reply (single
//! response or accumulated stream) is decoded and appended on success,
//! and a synthetic apology is appended on failure so the transcript
//! itself explains what happened. A reply arriving after the user has
//! switched conversations is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::api::{ApiClient, ChatEvent, RawReply};
use crate::decoder;
use crate::models::{Message, Role};
use crate::session::{SessionController, SessionError};
use crate::transport::TransportError;

/// Apology seeded client-side when a send fails; never persisted.
pub const APOLOGY: &str = "Sorry, something went wrong while answering. Please try again.";

/// Controller for sending messages within the active conversation
pub struct ExchangeController {
    api: ApiClient,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even when the send future is dropped
/// mid-await, so an abandoned send can never wedge the controller.
struct SendGuard(Arc<AtomicBool>);

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl ExchangeController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a send is currently in flight
    ///
    /// The UI disables input while this is true; a send attempted while
    /// one is in flight is a no-op.
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Send a user message and await the assistant reply
    ///
    /// No-op for blank text, a missing scope, or while another send is in
    /// flight. Creates the conversation implicitly on the first message.
    pub async fn send(
        &mut self,
        session: &mut SessionController,
        text: &str,
    ) -> Result<(), SessionError> {
        self.send_guarded(session, text, false).await
    }

    /// Streaming variant of [`ExchangeController::send`]
    ///
    /// Tokens accumulate into a single assistant message that is decoded
    /// and appended only once the stream ends; the reasoning/visible
    /// split is only meaningful on the complete text. The stream handle
    /// is dropped (and the connection aborted) on any early exit, so at
    /// most one stream is ever open per controller.
    pub async fn send_streaming(
        &mut self,
        session: &mut SessionController,
        text: &str,
    ) -> Result<(), SessionError> {
        self.send_guarded(session, text, true).await
    }

    async fn send_guarded(
        &mut self,
        session: &mut SessionController,
        text: &str,
        streaming: bool,
    ) -> Result<(), SessionError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            tracing::debug!("Ignoring blank send");
            return Ok(());
        }
        if session.scope().is_none() {
            tracing::debug!("Ignoring send without a selected scope");
            return Ok(());
        }
        if self.in_flight.swap(true, Ordering::Relaxed) {
            tracing::debug!("Ignoring send while another is in flight");
            return Ok(());
        }

        let _guard = SendGuard(self.in_flight.clone());
        self.send_inner(session, &text, streaming).await
    }

    async fn send_inner(
        &mut self,
        session: &mut SessionController,
        text: &str,
        streaming: bool,
    ) -> Result<(), SessionError> {
        // The user sees their own message before any round trip completes.
        session.store_mut().append_message(Message::user(text));

        let (conversation_id, created_now) = match session.store().active() {
            Some(active) => (active.id.clone(), false),
            None => {
                let Some(scope) = session.scope().cloned() else {
                    return Ok(());
                };
                // Title derives from the scope label unless the server is
                // left to pick its own default.
                let title = scope.label.clone();
                match self.api.create_conversation(&scope, title.as_deref()).await {
                    Ok(conversation) => {
                        let id = conversation.id.clone();
                        session.adopt_created(conversation);
                        (id, true)
                    }
                    Err(e) => {
                        // Conversation creation failed before anything was
                        // sent; the transcript still gets the apology.
                        if session.store().active().is_none() {
                            session
                                .store_mut()
                                .append_message(Message::synthetic_assistant(APOLOGY));
                        }
                        return Err(e.into());
                    }
                }
            }
        };

        let outcome = if streaming {
            self.exchange_streaming(&conversation_id, text).await
        } else {
            self.exchange_once(&conversation_id, text).await
        };

        let still_current =
            session.store().active().map(|c| c.id.as_str()) == Some(conversation_id.as_str());

        let send_result = match outcome {
            Ok(reply) => {
                if still_current {
                    session.store_mut().append_message(reply);
                } else {
                    tracing::warn!(
                        "Discarding reply for {}: conversation no longer active",
                        conversation_id
                    );
                }
                Ok(())
            }
            Err(e) => {
                if still_current {
                    session
                        .store_mut()
                        .append_message(Message::synthetic_assistant(APOLOGY));
                } else {
                    tracing::warn!(
                        "Discarding failure for {}: conversation no longer active",
                        conversation_id
                    );
                }
                Err(e.into())
            }
        };

        // Make a freshly created conversation visible in history at once.
        // The conversation exists server-side even when the chat call
        // failed, so the refresh is not skipped on error.
        if created_now {
            if let Err(e) = session.refresh_conversations().await {
                tracing::warn!("Failed to refresh conversation list: {e}");
            }
        }
        send_result
    }

    /// Single request/response exchange
    async fn exchange_once(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Message, TransportError> {
        let raw = self.api.send_chat(conversation_id, text).await?;
        Ok(Self::finalize_reply(raw))
    }

    fn finalize_reply(raw: RawReply) -> Message {
        let decoded = decoder::decode(&raw.content);
        Message {
            id: raw.id,
            role: Role::Assistant,
            content: decoded.visible,
            reasoning: decoded.reasoning,
            source_ref: raw.source_ref,
            created_at: raw.created_at,
        }
    }

    /// Push-stream exchange: accumulate tokens, finalize at end of stream
    async fn exchange_streaming(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Message, TransportError> {
        let mut stream = self.api.stream_chat(conversation_id, text).await?;

        let mut buffer = String::new();
        let mut source_ref = None;
        while let Some(payload) = stream.next().await {
            match ChatEvent::parse(&payload?) {
                Some(ChatEvent::Token(token)) => buffer.push_str(&token),
                Some(ChatEvent::Sources(sources)) => {
                    source_ref = crate::api::format_sources(&sources);
                }
                Some(ChatEvent::Error(message)) => {
                    // The backend reports RAG failures as an error frame on
                    // an otherwise-200 stream.
                    return Err(TransportError::Server {
                        status: 500,
                        message,
                    });
                }
                Some(ChatEvent::Done) => break,
                None => {}
            }
        }

        let decoded = decoder::decode(&buffer);
        Ok(Message {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: decoded.visible,
            reasoning: decoded.reasoning,
            source_ref,
            created_at: Utc::now(),
        })
    }
}
