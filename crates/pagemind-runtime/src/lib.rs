//! pagemind-runtime: contexts, protocol and model lifecycle
//!
//! This crate provides the message protocol exchanged between the background,
//! content and popup contexts, the notification bus, and the model lifecycle
//! manager that owns the inference engine's load state.

pub mod actions;
pub mod background;
pub mod bus;
pub mod conversation;
pub mod error;
pub mod events;
pub mod extractor;
pub mod history;
pub mod lifecycle;
pub mod page;
pub mod popup;
pub mod prompts;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod testing;

pub use actions::{ActionOutcome, ContextAction, Toast, ToastKind};
pub use background::BackgroundService;
pub use bus::{NotificationBus, Subscriber, Subscription};
pub use conversation::{Conversation, ConversationEntry, Role};
pub use error::{Error, Result};
pub use events::Notification;
pub use history::{HistoryRecord, HistoryStore, MemoryHistory};
pub use lifecycle::{ManagerConfig, ModelManager, ModelState, Phase};
pub use page::PageContext;
pub use popup::{PopupController, StatusKind, StatusLine};
pub use prompts::PromptTemplates;
pub use protocol::{Payload, Request, Response};
pub use transport::{Handler, Port, spawn_context};
