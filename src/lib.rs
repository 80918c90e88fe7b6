//! bookbot-client: conversation orchestration for the BookBot document-chat API
//!
//! This library provides:
//! - A typed transport over the backend REST surface, with a cancellable
//!   SSE push stream and upload progress reporting
//! - Reasoning-block extraction from raw assistant replies
//! - An in-memory conversation store with optimistic message state
//! - Lifecycle and exchange controllers implementing the chat view's
//!   state machine (scope selection, resume, rename, delete, send)

pub mod api;
pub mod config;
pub mod decoder;
pub mod exchange;
pub mod models;
pub mod session;
pub mod store;
pub mod transport;

pub use api::ApiClient;
pub use config::Config;
pub use exchange::{ExchangeController, APOLOGY};
pub use models::{Conversation, Document, IngestStatus, Library, Message, Role, Scope};
pub use session::{SessionController, SessionError, SessionState, GREETING};
pub use store::ConversationStore;
pub use transport::{EventStream, HttpTransport, Transport, TransportError};
