//! Chat state machine
//!
//! The single authoritative transform from (state, action) to next
//! state. Transport calls are issued by the session layer in response
//! to the resulting state; the only side channel is the owned
//! conversation trie, written synchronously when a turn ends.

use crate::trie::ConversationTrie;
use crate::types::{
    AltList, Alternative, BranchPoint, Conversation, Fragment, ModelInfo, Source, Turn, Weight,
};

/// State transitions understood by [`ChatState::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Append one streamed content element to the conversation tail
    Append { source: Source, fragment: Fragment },
    /// Replace the alternatives at a slot with a user-forced pick
    SelectAlternative {
        at: BranchPoint,
        previous: String,
        chosen: String,
    },
    /// Splice a refreshed alternative list into an existing slot
    SpliceAlternatives { at: BranchPoint, alts: AltList },
    /// Append a user turn and start generating
    SendMessage { text: String },
    /// Drop the conversation and seed it with a fresh opening turn
    Reset { text: String, source: Source },
    /// The current AI turn finished streaming
    EndOfTurn,
    /// Replace the conversation with a remembered continuation
    SetConversation { conversation: Conversation },
    /// Record the backend's model handshake
    SetModelInfo { info: ModelInfo },
    /// Update the sampling temperature
    SetTemperature { value: f64 },
    /// Update the per-turn token budget
    SetMaxNewTokens { value: u32 },
    /// Update the smallest probability worth displaying
    SetMinProbability { value: f64 },
    /// Replace the input buffer
    SetInput { text: String },
    /// Open the alternative picker at a position
    OpenAlternatives { at: BranchPoint },
    /// Close the alternative picker
    CloseAlternatives,
    /// Abandon an in-flight generation (error recovery)
    StopGenerating,
}

/// Canonical in-memory state of one chat session.
///
/// Mutated only through [`apply`]; owns the session's conversation trie.
///
/// [`apply`]: ChatState::apply
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    /// The canonical conversation
    pub conversation: Conversation,
    /// The user's unsent input buffer
    pub input: String,
    /// Position of the open alternative picker, if any
    pub open_alt: Option<BranchPoint>,
    /// Model handshake payload; `None` while the session is loading
    pub model_info: Option<ModelInfo>,
    /// Sampling temperature
    pub temperature: f64,
    /// Token budget per generated turn
    pub max_new_tokens: u32,
    /// Smallest probability worth displaying
    pub min_probability: f64,
    /// Whether a generation request is outstanding
    pub generating: bool,
    trie: ConversationTrie,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            conversation: Vec::new(),
            input: String::new(),
            open_alt: None,
            model_info: None,
            temperature: 1.0,
            max_new_tokens: 100,
            min_probability: 0.001,
            generating: false,
            trie: ConversationTrie::new(),
        }
    }
}

impl ChatState {
    /// Create a fresh session state
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's conversation cache
    pub fn trie(&self) -> &ConversationTrie {
        &self.trie
    }

    /// Look up a remembered continuation for `prefix` in the cache
    pub fn cached_continuation(&self, prefix: &[Turn]) -> Option<Conversation> {
        self.trie.search_and_return(prefix)
    }

    /// Apply one action.
    ///
    /// Deterministic: the same state and action always produce the same
    /// next state. Out-of-range coordinates come from a stale caller and
    /// are ignored rather than treated as errors.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Append { source, fragment } => self.append(source, fragment),
            Action::SelectAlternative {
                at,
                previous,
                chosen,
            } => self.select_alternative(at, previous, chosen),
            Action::SpliceAlternatives { at, alts } => self.splice_alternatives(at, alts),
            Action::SendMessage { text } => self.send_message(text),
            Action::Reset { text, source } => self.reset(text, source),
            Action::EndOfTurn => self.end_of_turn(),
            Action::SetConversation { conversation } => {
                self.conversation = conversation;
                self.open_alt = None;
            }
            Action::SetModelInfo { info } => self.model_info = Some(info),
            Action::SetTemperature { value } => self.temperature = value,
            Action::SetMaxNewTokens { value } => self.max_new_tokens = value,
            Action::SetMinProbability { value } => self.min_probability = value,
            Action::SetInput { text } => self.input = text,
            Action::OpenAlternatives { at } => {
                if self.fragment_at(at).is_some() {
                    self.open_alt = Some(at);
                }
            }
            Action::CloseAlternatives => self.open_alt = None,
            Action::StopGenerating => self.generating = false,
        }
    }

    /// Slice the conversation up to and including `at`, the prefix shape
    /// handed to the cache before a pick is forwarded to the backend.
    pub fn prefix_up_to(&self, at: BranchPoint) -> Option<Conversation> {
        let turn = self.conversation.get(at.turn)?;
        let mut prefix: Conversation = self.conversation[..at.turn].to_vec();
        match turn {
            Turn::Ai { content } => {
                if at.slot >= content.len() {
                    return None;
                }
                prefix.push(Turn::Ai {
                    content: content[..=at.slot].to_vec(),
                });
            }
            Turn::User { .. } => prefix.push(turn.clone()),
        }
        Some(prefix)
    }

    /// The displayed text at a position, if it exists
    pub fn leading_text_at(&self, at: BranchPoint) -> Option<&str> {
        self.fragment_at(at)?.key()
    }

    fn fragment_at(&self, at: BranchPoint) -> Option<&Fragment> {
        match self.conversation.get(at.turn)? {
            Turn::Ai { content } => content.get(at.slot),
            Turn::User { .. } => None,
        }
    }

    fn append(&mut self, source: Source, fragment: Fragment) {
        if self.conversation.last().map(Turn::source) == Some(source) {
            match self.conversation.last_mut() {
                Some(Turn::Ai { content }) => content.push(fragment),
                Some(Turn::User { content }) => {
                    if let Some(text) = fragment.key() {
                        content.push_str(text);
                    }
                }
                None => unreachable!("matched source of the last turn"),
            }
            return;
        }
        match source {
            Source::Ai => self.conversation.push(Turn::Ai {
                content: vec![fragment],
            }),
            Source::User => {
                let text = fragment.key().unwrap_or_default().to_string();
                self.conversation.push(Turn::User { content: text });
            }
        }
    }

    fn select_alternative(&mut self, at: BranchPoint, previous: String, chosen: String) {
        let Some(Turn::Ai { content }) = self.conversation.get_mut(at.turn) else {
            return;
        };
        if at.slot >= content.len() {
            return;
        }
        content[at.slot] = Fragment::Alts(vec![
            Alternative::new(chosen, Weight::Picked),
            Alternative::new(previous, Weight::Previous),
        ]);
        // Everything downstream of the pick is about to be regenerated.
        content.truncate(at.slot + 1);
        self.conversation.truncate(at.turn + 1);
        self.open_alt = None;
        self.generating = true;
    }

    fn splice_alternatives(&mut self, at: BranchPoint, alts: AltList) {
        let Some(Turn::Ai { content }) = self.conversation.get_mut(at.turn) else {
            return;
        };
        let Some(Fragment::Alts(existing)) = content.get_mut(at.slot) else {
            return;
        };
        let Some(leading) = existing.first().cloned() else {
            return;
        };
        let mut merged = vec![leading.clone()];
        merged.extend(alts.into_iter().filter(|a| a.text != leading.text));
        *existing = merged;
    }

    fn send_message(&mut self, text: String) {
        self.conversation.push(Turn::user(text));
        self.input.clear();
        self.open_alt = None;
        self.generating = true;
    }

    fn reset(&mut self, text: String, source: Source) {
        self.conversation.clear();
        let opener = match source {
            Source::User => Turn::user(text),
            Source::Ai => Turn::ai(vec![Fragment::Text(text)]),
        };
        self.conversation.push(opener);
        self.trie.clear();
        self.input.clear();
        self.open_alt = None;
        self.generating = true;
    }

    fn end_of_turn(&mut self) {
        if !self.generating {
            tracing::debug!("end-of-turn with no generation outstanding, ignoring");
            return;
        }
        self.generating = false;
        self.trie.insert(&self.conversation);
    }
}
