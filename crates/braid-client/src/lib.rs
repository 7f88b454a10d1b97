//! braid-client: session runtime for branching chat backends
//!
//! This crate drives a [`braid_chat`] state machine over a live duplex
//! connection: the websocket transport with reconnect policy, the
//! session orchestrator that reconciles cache hits with in-flight
//! generation, and a typed client for the model manager's REST surface.

pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use registry::RegistryClient;
pub use session::{ChatSession, SessionEvent};
pub use transport::{ReconnectPolicy, SessionTarget, Transport, WsTransport};
