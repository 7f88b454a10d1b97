//! braid-chat: conversation model, branch cache, and chat state machine
//!
//! This crate holds the synchronous core of a branching chat client:
//! the conversation data model, the prefix-trie cache that remembers
//! every continuation the backend has produced, the reducer that owns
//! the canonical conversation, and the wire protocol contract.

pub mod error;
pub mod protocol;
pub mod state;
pub mod trie;
pub mod types;

pub use error::{Error, Result};
pub use protocol::{ChatMode, ClientCommand, ConfigUpdate, ServerEvent};
pub use state::{Action, ChatState};
pub use trie::ConversationTrie;
pub use types::*;
