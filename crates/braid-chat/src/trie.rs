//! Prefix-trie cache over conversation continuations
//!
//! Remembers every token/turn sequence the backend has produced for a
//! session so identical prefixes can be replayed without re-querying.
//! Keys are per-fragment rather than per-turn: editing a single token
//! inside a long AI turn keeps every cached token around the edit point
//! reachable instead of invalidating the whole turn.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AltList, Conversation, Fragment, Source, Turn};

/// Insertion-ordered map of child edges.
///
/// Lookup goes through a hash map; a parallel key list records insertion
/// order so the most recently added edge is always recoverable.
/// Re-inserting an existing key keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildMap {
    nodes: HashMap<String, TrieNode>,
    order: Vec<String>,
}

impl ChildMap {
    /// Look up the node for `key`
    pub fn get(&self, key: &str) -> Option<&TrieNode> {
        self.nodes.get(key)
    }

    /// Fetch the node for `key`, creating an empty one tagged with
    /// `source` if absent. Fresh keys append to the insertion order.
    fn ensure(&mut self, key: &str, source: Source) -> &mut TrieNode {
        if !self.nodes.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.nodes
            .entry(key.to_string())
            .or_insert_with(|| TrieNode::new(source))
    }

    /// The most recently inserted edge, if any
    fn last(&self) -> Option<(&str, &TrieNode)> {
        let key = self.order.last()?;
        self.nodes.get(key).map(|node| (key.as_str(), node))
    }

    /// Number of child edges
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether this map has no child edges
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// A single cached edge: the party that produced it, plus the alternative
/// list when the edge represents a decision point (empty otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrieNode {
    pub source: Source,
    pub content: AltList,
    pub children: ChildMap,
}

impl TrieNode {
    fn new(source: Source) -> Self {
        Self {
            source,
            content: AltList::new(),
            children: ChildMap::default(),
        }
    }
}

/// In-memory prefix tree over conversation turns, keyed by literal text.
///
/// Owned by one chat session; written only when a turn finishes
/// streaming and read only through [`search_and_return`].
///
/// [`search_and_return`]: ConversationTrie::search_and_return
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationTrie {
    root: ChildMap,
}

impl ConversationTrie {
    /// Create an empty trie
    pub fn new() -> Self {
        Self::default()
    }

    /// Child edges hanging off the root
    pub fn root(&self) -> &ChildMap {
        &self.root
    }

    /// Insert a completed conversation, one edge per turn element.
    ///
    /// An existing edge keeps its position and its subtree; its source
    /// and alternative list are replaced (last write wins), which is how
    /// a refreshed alternative list displaces a stale one.
    pub fn insert(&mut self, conversation: &[Turn]) {
        let mut current = &mut self.root;
        for turn in conversation {
            match turn {
                Turn::User { content } => {
                    let node = current.ensure(content, Source::User);
                    node.source = Source::User;
                    node.content = AltList::new();
                    current = &mut node.children;
                }
                Turn::Ai { content } => {
                    for fragment in content {
                        // An empty decision point carries no key.
                        let Some(key) = fragment.key() else { continue };
                        let stored = match fragment {
                            Fragment::Text(_) => AltList::new(),
                            Fragment::Alts(alts) => alts.clone(),
                        };
                        let node = current.ensure(key, Source::Ai);
                        node.source = Source::Ai;
                        node.content = stored;
                        current = &mut node.children;
                    }
                }
            }
        }
    }

    /// Walk the trie along `prefix` and, on a full match, extend the
    /// result along the most recently inserted edge at every node,
    /// regrouping edges back into turns by contiguous source runs.
    ///
    /// Returns `None` the moment any key (or its source tag) is absent:
    /// a cache miss, and the caller's cue to fall back to live
    /// generation. The returned prefix carries the trie's stored
    /// alternative lists, so a refreshed list replaces a stale one in
    /// the query.
    pub fn search_and_return(&self, prefix: &[Turn]) -> Option<Conversation> {
        if prefix.is_empty() {
            return None;
        }

        let mut current = &self.root;
        let mut result: Conversation = Vec::with_capacity(prefix.len());

        for turn in prefix {
            match turn {
                Turn::User { content } => {
                    let node = current.get(content)?;
                    if node.source != Source::User {
                        return None;
                    }
                    result.push(Turn::user(content.clone()));
                    current = &node.children;
                }
                Turn::Ai { content } => {
                    let mut rebuilt = Vec::with_capacity(content.len());
                    for fragment in content {
                        let Some(key) = fragment.key() else { continue };
                        let node = current.get(key)?;
                        if node.source != Source::Ai {
                            return None;
                        }
                        rebuilt.push(Self::stored_fragment(key, node));
                        current = &node.children;
                    }
                    result.push(Turn::Ai { content: rebuilt });
                }
            }
        }

        // The remembered continuation may extend the prefix's final turn,
        // so take it back off and keep appending while the source runs on.
        let mut last = result.pop()?;
        loop {
            let Some((key, node)) = current.last() else { break };
            match node.source {
                Source::Ai => {
                    if let Turn::Ai { content } = &mut last {
                        content.push(Self::stored_fragment(key, node));
                    } else {
                        result.push(last);
                        last = Turn::Ai {
                            content: vec![Self::stored_fragment(key, node)],
                        };
                    }
                }
                // Each user edge is one complete turn.
                Source::User => {
                    result.push(last);
                    last = Turn::user(key);
                }
            }
            current = &node.children;
        }
        result.push(last);

        Some(result)
    }

    /// Reset to an empty root
    pub fn clear(&mut self) {
        self.root = ChildMap::default();
    }

    /// Serialize the whole node graph to a self-describing JSON blob
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild a trie from a blob produced by [`serialize`]
    ///
    /// [`serialize`]: ConversationTrie::serialize
    pub fn deserialize(blob: &str) -> Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }

    fn stored_fragment(key: &str, node: &TrieNode) -> Fragment {
        if node.content.is_empty() {
            Fragment::text(key)
        } else {
            Fragment::Alts(node.content.clone())
        }
    }
}
