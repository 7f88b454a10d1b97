//! Wire protocol contract between the chat core and the backend
//!
//! One duplex channel per session carries these envelopes as JSON
//! objects discriminated by a `type` code. Events for one outstanding
//! command arrive in the order the backend produced them; the channel
//! does no multiplexing, so a second command must wait for the first's
//! terminal event.

use serde::{Deserialize, Serialize};

use crate::types::{AltList, BranchPoint, Fragment, ModelInfo, Source};

/// Backend conversation style, selected at session bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Multi-turn chat with alternating user and AI turns
    Chat,
    /// Single-shot text completion seeded by the prompt
    TextGeneration,
}

/// Events delivered by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Model identity and footprint; sent exactly once, before any
    /// content. The session is "loading" until this arrives.
    ModelInfo(ModelInfo),
    /// One content element to append to the turn currently streaming
    NewMessage { source: Source, content: Fragment },
    /// The current AI turn is complete
    NewMessageEnd,
    /// Replacement alternatives for one position, answering a refresh
    RefreshWord { at: BranchPoint, alts: AltList },
    /// Out-of-band failure notice; conversation state is untouched
    Error { message: String },
}

impl ServerEvent {
    /// Whether this event terminates an outstanding generation command
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::NewMessageEnd | ServerEvent::Error { .. })
    }
}

/// Commands issued to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start or resume generation. `branch` identifies where generation
    /// resumes; `None` means from scratch.
    NewMessage {
        content: String,
        source: Source,
        branch: Option<BranchPoint>,
    },
    /// Regenerate from a position with the chosen candidate forced
    SelectWord { at: BranchPoint, word: String },
    /// Update one generation parameter for subsequent requests
    ChangeConfig(ConfigUpdate),
    /// Request exactly one fresh alternative list at a position
    RefreshWord { at: BranchPoint },
    /// Discard the backend's conversation context
    Clear,
}

/// A named generation parameter and its new value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum ConfigUpdate {
    Temperature(f64),
    MaxNewTokens(u32),
    MinProbability(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Alternative;

    #[test]
    fn test_model_info_event_shape() {
        let event = ServerEvent::ModelInfo(ModelInfo {
            name: "llama".into(),
            estimated_ram: 4.5,
            estimated_vram: 2.0,
        });
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"model_info","name":"llama","estimated_ram":4.5,"estimated_vram":2.0}"#
        );
    }

    #[test]
    fn test_new_message_event_with_alternatives() {
        let json = r#"{"type":"new_message","source":"ai","content":[["how",0.8],["I",0.2]]}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::NewMessage {
                source: Source::Ai,
                content: Fragment::Alts(vec![
                    Alternative::prob("how", 0.8),
                    Alternative::prob("I", 0.2),
                ]),
            }
        );
    }

    #[test]
    fn test_new_message_event_with_text() {
        let json = r#"{"type":"new_message","source":"ai","content":"\n"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::NewMessage {
                source: Source::Ai,
                content: Fragment::text("\n"),
            }
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(ServerEvent::NewMessageEnd.is_terminal());
        assert!(ServerEvent::Error { message: "x".into() }.is_terminal());
        assert!(!ServerEvent::ModelInfo(ModelInfo {
            name: "m".into(),
            estimated_ram: 0.0,
            estimated_vram: 0.0,
        })
        .is_terminal());
    }

    #[test]
    fn test_new_message_command_shape() {
        let command = ClientCommand::NewMessage {
            content: "hello".into(),
            source: Source::User,
            branch: None,
        };
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"type":"new_message","content":"hello","source":"user","branch":null}"#
        );

        let branched = ClientCommand::NewMessage {
            content: "hello".into(),
            source: Source::User,
            branch: Some(BranchPoint::new(2, 1)),
        };
        assert_eq!(
            serde_json::to_string(&branched).unwrap(),
            r#"{"type":"new_message","content":"hello","source":"user","branch":{"turn":2,"slot":1}}"#
        );
    }

    #[test]
    fn test_change_config_command_shape() {
        let command = ClientCommand::ChangeConfig(ConfigUpdate::Temperature(0.7));
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"type":"change_config","name":"temperature","value":0.7}"#
        );

        let command = ClientCommand::ChangeConfig(ConfigUpdate::MaxNewTokens(150));
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"type":"change_config","name":"max_new_tokens","value":150}"#
        );
    }

    #[test]
    fn test_command_round_trip() {
        let commands = vec![
            ClientCommand::SelectWord {
                at: BranchPoint::new(1, 3),
                word: "how".into(),
            },
            ClientCommand::RefreshWord {
                at: BranchPoint::new(0, 2),
            },
            ClientCommand::Clear,
            ClientCommand::ChangeConfig(ConfigUpdate::MinProbability(0.01)),
        ];
        for command in commands {
            let json = serde_json::to_string(&command).unwrap();
            let back: ClientCommand = serde_json::from_str(&json).unwrap();
            assert_eq!(back, command);
        }
    }
}
