//! Chat session orchestration
//!
//! [`ChatSession`] is the single-threaded owner of one conversation: it
//! holds the state machine (and with it the branch cache), drives the
//! transport, and turns backend events into reducer actions. Every
//! externally triggered transition runs to completion before the next
//! is considered, and at most one generation command is outstanding at
//! a time.

use braid_chat::protocol::{ChatMode, ClientCommand, ConfigUpdate, ServerEvent};
use braid_chat::state::{Action, ChatState};
use braid_chat::types::{
    Alternative, BranchPoint, Fragment, ModelInfo, Source, Turn, Weight,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Notifications surfaced to the embedding UI as the session advances
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The model handshake completed
    Ready { info: ModelInfo },
    /// A streamed content element was applied to the conversation
    Fragment { source: Source, fragment: Fragment },
    /// The current AI turn finished and became replayable
    TurnEnd,
    /// A refreshed alternative list was spliced in
    Refreshed { at: BranchPoint },
    /// The conversation was replaced from the cache without generation
    Replayed,
    /// The backend reported a failure
    BackendError { message: String },
}

/// One live chat session: state machine, cache, and transport.
///
/// Constructed at session start and discarded at session end; nothing
/// outside the session holds a reference to its state or its trie.
pub struct ChatSession {
    id: Uuid,
    state: ChatState,
    transport: Box<dyn Transport>,
    mode: ChatMode,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Create a session over an established transport
    pub fn new(transport: Box<dyn Transport>, mode: ChatMode) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            id: Uuid::new_v4(),
            state: ChatState::new(),
            transport,
            mode,
            event_tx,
        }
    }

    /// Session identifier (for logging and correlation)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The current session state
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Subscribe to session notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Apply a UI-side action (input buffer, picker cursor, parameters)
    pub fn dispatch(&mut self, action: Action) {
        self.state.apply(action);
    }

    /// Wait for the model handshake. The backend sends `model_info`
    /// exactly once, before any content; no content request may be
    /// issued until it arrives.
    pub async fn wait_ready(&mut self) -> Result<ModelInfo> {
        match self.transport.recv().await? {
            Some(ServerEvent::ModelInfo(info)) => {
                self.state.apply(Action::SetModelInfo { info: info.clone() });
                self.emit(SessionEvent::Ready { info: info.clone() });
                Ok(info)
            }
            Some(event) => Err(Error::Protocol(format!(
                "expected model_info before any content, got {event:?}"
            ))),
            None => Err(Error::Closed),
        }
    }

    /// Send the user's message and stream the reply to completion.
    ///
    /// In chat mode this appends a user turn and resumes from it; in
    /// completion mode every prompt starts a fresh generation.
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        self.ensure_idle()?;
        match self.mode {
            ChatMode::Chat => {
                self.state.apply(Action::SendMessage { text: text.into() });
                let branch = BranchPoint::new(self.state.conversation.len() - 1, 0);
                self.transport
                    .send(&ClientCommand::NewMessage {
                        content: text.into(),
                        source: Source::User,
                        branch: Some(branch),
                    })
                    .await?;
            }
            ChatMode::TextGeneration => {
                self.state.apply(Action::Reset {
                    text: text.into(),
                    source: Source::Ai,
                });
                self.transport
                    .send(&ClientCommand::NewMessage {
                        content: text.into(),
                        source: Source::Ai,
                        branch: None,
                    })
                    .await?;
            }
        }
        self.stream_turn().await
    }

    /// Start an unrelated conversation: drop the backend context, the
    /// cache, and the local history, then send the opening message.
    pub async fn new_conversation(&mut self, text: &str) -> Result<()> {
        self.ensure_idle()?;
        self.transport.send(&ClientCommand::Clear).await?;
        let source = match self.mode {
            ChatMode::Chat => Source::User,
            ChatMode::TextGeneration => Source::Ai,
        };
        self.state.apply(Action::Reset {
            text: text.into(),
            source,
        });
        self.transport
            .send(&ClientCommand::NewMessage {
                content: text.into(),
                source,
                branch: None,
            })
            .await?;
        self.stream_turn().await
    }

    /// Pick an alternative at a position.
    ///
    /// The cache keys every decision point by its leading candidate, so
    /// the branch is looked up as it would read with the picked word in
    /// front; a hit replays the remembered continuation without touching
    /// the backend, a miss forces regeneration from the branch point.
    pub async fn pick(&mut self, at: BranchPoint, word: &str) -> Result<()> {
        self.ensure_idle()?;
        let Some(previous) = self.state.leading_text_at(at).map(str::to_string) else {
            tracing::warn!(session = %self.id, ?at, "pick at stale position ignored");
            return Ok(());
        };
        let Some(mut prefix) = self.state.prefix_up_to(at) else {
            return Ok(());
        };
        if let Some(Turn::Ai { content }) = prefix.last_mut() {
            if let Some(slot) = content.last_mut() {
                *slot = Fragment::Alts(vec![Alternative::new(word, Weight::Picked)]);
            }
        }

        if let Some(conversation) = self.state.cached_continuation(&prefix) {
            tracing::debug!(session = %self.id, ?at, word, "cache hit, replaying branch");
            self.state.apply(Action::SetConversation { conversation });
            self.emit(SessionEvent::Replayed);
            return Ok(());
        }

        tracing::debug!(session = %self.id, ?at, word, "cache miss, regenerating");
        self.state.apply(Action::SelectAlternative {
            at,
            previous,
            chosen: word.to_string(),
        });
        self.transport
            .send(&ClientCommand::SelectWord {
                at,
                word: word.to_string(),
            })
            .await?;
        self.stream_turn().await
    }

    /// Ask the backend for one fresh alternative list at a position.
    ///
    /// The conversation is left untouched until the reply arrives; the
    /// returned list is then spliced in behind the current leading
    /// candidate.
    pub async fn refresh(&mut self, at: BranchPoint) -> Result<()> {
        self.ensure_idle()?;
        self.transport
            .send(&ClientCommand::RefreshWord { at })
            .await?;
        loop {
            match self.transport.recv().await? {
                Some(ServerEvent::RefreshWord { at, alts }) => {
                    self.state.apply(Action::SpliceAlternatives { at, alts });
                    self.emit(SessionEvent::Refreshed { at });
                    return Ok(());
                }
                Some(ServerEvent::Error { message }) => {
                    self.emit(SessionEvent::BackendError {
                        message: message.clone(),
                    });
                    return Err(Error::Backend(message));
                }
                Some(event) => {
                    tracing::warn!(session = %self.id, ?event, "unexpected event while awaiting refresh");
                }
                None => return Err(Error::Closed),
            }
        }
    }

    /// Update one generation parameter locally and server-side
    pub async fn set_config(&mut self, update: ConfigUpdate) -> Result<()> {
        match update {
            ConfigUpdate::Temperature(value) => {
                self.state.apply(Action::SetTemperature { value });
            }
            ConfigUpdate::MaxNewTokens(value) => {
                self.state.apply(Action::SetMaxNewTokens { value });
            }
            ConfigUpdate::MinProbability(value) => {
                self.state.apply(Action::SetMinProbability { value });
            }
        }
        self.transport
            .send(&ClientCommand::ChangeConfig(update))
            .await
    }

    /// Close the session channel. This is the only cancellation
    /// primitive: an in-flight request cannot be aborted mid-stream.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state.generating {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Pump backend events into the reducer until the turn's terminal
    /// event arrives.
    async fn stream_turn(&mut self) -> Result<()> {
        loop {
            match self.transport.recv().await {
                Ok(Some(ServerEvent::NewMessage { source, content })) => {
                    self.state.apply(Action::Append {
                        source,
                        fragment: content.clone(),
                    });
                    self.emit(SessionEvent::Fragment {
                        source,
                        fragment: content,
                    });
                }
                Ok(Some(ServerEvent::NewMessageEnd)) => {
                    self.state.apply(Action::EndOfTurn);
                    self.emit(SessionEvent::TurnEnd);
                    return Ok(());
                }
                Ok(Some(ServerEvent::Error { message })) => {
                    self.state.apply(Action::StopGenerating);
                    self.emit(SessionEvent::BackendError {
                        message: message.clone(),
                    });
                    return Err(Error::Backend(message));
                }
                Ok(Some(ServerEvent::ModelInfo(info))) => {
                    tracing::warn!(session = %self.id, "late model_info during stream");
                    self.state.apply(Action::SetModelInfo { info });
                }
                Ok(Some(ServerEvent::RefreshWord { at, alts })) => {
                    // Answer to an earlier refresh that raced the stream.
                    self.state.apply(Action::SpliceAlternatives { at, alts });
                    self.emit(SessionEvent::Refreshed { at });
                }
                Ok(None) => {
                    self.state.apply(Action::StopGenerating);
                    return Err(Error::Closed);
                }
                Err(e) => {
                    self.state.apply(Action::StopGenerating);
                    return Err(e);
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
