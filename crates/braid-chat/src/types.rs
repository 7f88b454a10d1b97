//! Core types for branching conversations

use serde::{Deserialize, Serialize};

/// Which party produced a turn or trie edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Ai,
}

/// Wire value marking a candidate kept for reference after a manual pick.
pub const PREVIOUS_SENTINEL: f64 = -1.0;
/// Wire value marking a user-forced pick with no computed probability.
pub const PICKED_SENTINEL: f64 = -2.0;

/// Weight attached to one candidate: a model-estimated probability, or a
/// reserved marker for candidates that did not come from the model.
///
/// On the wire a weight is a plain number: probabilities live in `[0, 1]`
/// and the two markers use the reserved values `-1` and `-2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum Weight {
    /// Model-estimated probability in `[0, 1]`
    Prob(f64),
    /// The candidate that was displayed before a manual pick replaced it
    Previous,
    /// A user-forced pick with no computed probability
    Picked,
}

impl From<f64> for Weight {
    fn from(value: f64) -> Self {
        if value == PREVIOUS_SENTINEL {
            Weight::Previous
        } else if value == PICKED_SENTINEL {
            Weight::Picked
        } else {
            Weight::Prob(value)
        }
    }
}

impl From<Weight> for f64 {
    fn from(weight: Weight) -> Self {
        match weight {
            Weight::Prob(p) => p,
            Weight::Previous => PREVIOUS_SENTINEL,
            Weight::Picked => PICKED_SENTINEL,
        }
    }
}

/// One candidate continuation at a generation position.
///
/// Serializes as a two-element `[text, weight]` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f64)", into = "(String, f64)")]
pub struct Alternative {
    pub text: String,
    pub weight: Weight,
}

impl Alternative {
    /// Create a new alternative
    pub fn new(text: impl Into<String>, weight: Weight) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }

    /// Create a model-estimated alternative
    pub fn prob(text: impl Into<String>, probability: f64) -> Self {
        Self::new(text, Weight::Prob(probability))
    }
}

impl From<(String, f64)> for Alternative {
    fn from((text, weight): (String, f64)) -> Self {
        Self {
            text,
            weight: weight.into(),
        }
    }
}

impl From<Alternative> for (String, f64) {
    fn from(alt: Alternative) -> Self {
        (alt.text, alt.weight.into())
    }
}

/// Ranked candidates offered at one generation position.
///
/// The first element is the currently-selected/displayed candidate.
pub type AltList = Vec<Alternative>;

/// One element of an AI turn: a literal text run or a decision point
/// carrying the ranked alternatives offered at that position.
///
/// Generated text interleaves literal characters (including newlines)
/// with decision points, so both shapes appear inside a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fragment {
    Text(String),
    Alts(AltList),
}

impl Fragment {
    /// Create a literal text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// The literal text this fragment contributes to the flattened turn,
    /// which doubles as its cache key. `None` for an empty decision point.
    pub fn key(&self) -> Option<&str> {
        match self {
            Fragment::Text(text) => Some(text),
            Fragment::Alts(alts) => alts.first().map(|a| a.text.as_str()),
        }
    }
}

/// One conversational contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Turn {
    User { content: String },
    Ai { content: Vec<Fragment> },
}

impl Turn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an AI turn
    pub fn ai(content: Vec<Fragment>) -> Self {
        Self::Ai { content }
    }

    /// Which party produced this turn
    pub fn source(&self) -> Source {
        match self {
            Self::User { .. } => Source::User,
            Self::Ai { .. } => Source::Ai,
        }
    }

    /// Flatten the turn to the literal text it displays
    pub fn text(&self) -> String {
        match self {
            Self::User { content } => content.clone(),
            Self::Ai { content } => content.iter().filter_map(Fragment::key).collect(),
        }
    }
}

/// An ordered sequence of turns
pub type Conversation = Vec<Turn>;

/// Coordinate identifying where a generation request resumes within an
/// existing conversation: a turn index plus a position inside that turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPoint {
    pub turn: usize,
    pub slot: usize,
}

impl BranchPoint {
    /// Create a new branch point
    pub fn new(turn: usize, slot: usize) -> Self {
        Self { turn, slot }
    }
}

/// Model identity and measured memory footprint, reported once per session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Estimated RAM usage in GB
    pub estimated_ram: f64,
    /// Estimated VRAM usage in GB
    pub estimated_vram: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sentinel_round_trip() {
        assert_eq!(Weight::from(-1.0), Weight::Previous);
        assert_eq!(Weight::from(-2.0), Weight::Picked);
        assert_eq!(Weight::from(0.75), Weight::Prob(0.75));
        assert_eq!(f64::from(Weight::Previous), -1.0);
        assert_eq!(f64::from(Weight::Picked), -2.0);
    }

    #[test]
    fn test_alternative_serializes_as_pair() {
        let alt = Alternative::prob("how", 0.8);
        assert_eq!(serde_json::to_string(&alt).unwrap(), r#"["how",0.8]"#);

        let picked = Alternative::new("I", Weight::Picked);
        assert_eq!(serde_json::to_string(&picked).unwrap(), r#"["I",-2.0]"#);
    }

    #[test]
    fn test_fragment_untagged_round_trip() {
        let text: Fragment = serde_json::from_str(r#""hi""#).unwrap();
        assert_eq!(text, Fragment::text("hi"));

        let alts: Fragment = serde_json::from_str(r#"[["how",0.8],["I",0.2]]"#).unwrap();
        assert_eq!(
            alts,
            Fragment::Alts(vec![Alternative::prob("how", 0.8), Alternative::prob("I", 0.2)])
        );
    }

    #[test]
    fn test_fragment_key() {
        assert_eq!(Fragment::text("hi").key(), Some("hi"));
        let alts = Fragment::Alts(vec![Alternative::prob("how", 0.8)]);
        assert_eq!(alts.key(), Some("how"));
        assert_eq!(Fragment::Alts(vec![]).key(), None);
    }

    #[test]
    fn test_turn_serde_shape() {
        let turn = Turn::user("hello");
        assert_eq!(
            serde_json::to_string(&turn).unwrap(),
            r#"{"source":"user","content":"hello"}"#
        );

        let ai = Turn::ai(vec![Fragment::text("hi")]);
        assert_eq!(
            serde_json::to_string(&ai).unwrap(),
            r#"{"source":"ai","content":["hi"]}"#
        );
    }

    #[test]
    fn test_turn_text_flattens_fragments() {
        let turn = Turn::ai(vec![
            Fragment::text("hi "),
            Fragment::Alts(vec![Alternative::prob("there", 0.9), Alternative::prob("friend", 0.1)]),
        ]);
        assert_eq!(turn.text(), "hi there");
    }
}
