//! Graph node model.
//!
//! # Responsibility
//! - Define notes/people as graph entities with searchable match terms.
//!
//! # Invariants
//! - `id` is stable across edits and never reused for another node.
//! - `version` only grows; a content-affecting mutation bumps it.
//! - Person nodes always carry at least one non-blank name.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier shared with the external note/person repository.
pub type NodeId = Uuid;

/// Label given to notes without a derivable title.
pub const UNTITLED_NOTE_TITLE: &str = "Untitled note";

/// Entity category for graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Note,
    Person,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Person => "person",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(Self::Note),
            "person" => Some(Self::Person),
            _ => None,
        }
    }

    /// Rank used when two nodes claim the same text span; lower wins.
    pub(crate) fn tie_rank(self) -> u8 {
        match self {
            Self::Person => 0,
            Self::Note => 1,
        }
    }
}

/// Origin of one match term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    /// Derived note title.
    Title,
    /// Person full name.
    FullName,
    /// User-maintained alternative name.
    Alias,
    /// First name, nickname or other abbreviated form.
    ShortName,
}

impl TermKind {
    /// Multiplier applied on top of term specificity.
    pub fn weight(self) -> f64 {
        match self {
            Self::Title | Self::FullName => 1.0,
            Self::Alias => 0.9,
            Self::ShortName => 0.8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::FullName => "full_name",
            Self::Alias => "alias",
            Self::ShortName => "short_name",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(Self::Title),
            "full_name" => Some(Self::FullName),
            "alias" => Some(Self::Alias),
            "short_name" => Some(Self::ShortName),
            _ => None,
        }
    }
}

/// Searchable text contributed by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchTerm {
    pub text: String,
    pub kind: TermKind,
}

impl MatchTerm {
    pub fn new(text: impl Into<String>, kind: TermKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Names published by the person repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonNames {
    pub full_name: String,
    #[serde(default)]
    pub short_names: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl PersonNames {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn with_short_name(mut self, value: impl Into<String>) -> Self {
        self.short_names.push(value.into());
        self
    }

    pub fn with_alias(mut self, value: impl Into<String>) -> Self {
        self.aliases.push(value.into());
        self
    }
}

/// Graph entity mirrored from a note or person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    pub terms: Vec<MatchTerm>,
    /// `0` on an upsert request means "assign next version".
    pub version: u64,
}

impl Node {
    /// Builds a note node whose only match term is its title.
    ///
    /// A `None` title yields an "Untitled note" label with no match terms,
    /// so untitled notes can be mentioned by nobody.
    pub fn note(id: NodeId, title: Option<String>, version: u64) -> Self {
        let (title, terms) = match title {
            Some(value) => {
                let trimmed = value.trim().to_string();
                let terms = vec![MatchTerm::new(trimmed.clone(), TermKind::Title)];
                (trimmed, terms)
            }
            None => (UNTITLED_NOTE_TITLE.to_string(), Vec::new()),
        };
        Self {
            id,
            kind: NodeKind::Note,
            title,
            terms,
            version,
        }
    }

    /// Builds a person node from repository names.
    pub fn person(id: NodeId, names: &PersonNames, version: u64) -> Self {
        let title = names.full_name.trim().to_string();
        let mut terms = Vec::new();
        if !title.is_empty() {
            terms.push(MatchTerm::new(title.clone(), TermKind::FullName));
        }
        for alias in &names.aliases {
            push_unique_term(&mut terms, alias, TermKind::Alias);
        }
        for short in &names.short_names {
            push_unique_term(&mut terms, short, TermKind::ShortName);
        }
        Self {
            id,
            kind: NodeKind::Person,
            title,
            terms,
            version,
        }
    }

    /// Validates node invariants before index mutation.
    pub fn validate(&self) -> Result<(), NodeValidationError> {
        if self.title.trim().is_empty() {
            return Err(NodeValidationError::BlankTitle(self.id));
        }
        if self.kind == NodeKind::Person && self.terms.is_empty() {
            return Err(NodeValidationError::PersonWithoutNames(self.id));
        }
        if let Some(term) = self.terms.iter().find(|term| term.text.trim().is_empty()) {
            return Err(NodeValidationError::BlankTerm {
                node_id: self.id,
                kind: term.kind,
            });
        }
        Ok(())
    }

    /// Whether title or match terms differ from `other`.
    pub fn terms_differ(&self, other: &Node) -> bool {
        self.title != other.title || self.terms != other.terms
    }
}

fn push_unique_term(terms: &mut Vec<MatchTerm>, value: &str, kind: TermKind) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    let duplicate = terms
        .iter()
        .any(|term| term.text.to_lowercase() == trimmed.to_lowercase());
    if !duplicate {
        terms.push(MatchTerm::new(trimmed, kind));
    }
}

/// Node payload validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValidationError {
    BlankTitle(NodeId),
    PersonWithoutNames(NodeId),
    BlankTerm { node_id: NodeId, kind: TermKind },
}

impl Display for NodeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle(id) => write!(f, "node {id} has a blank title"),
            Self::PersonWithoutNames(id) => write!(f, "person {id} has no usable name"),
            Self::BlankTerm { node_id, kind } => {
                write!(f, "node {node_id} has a blank `{}` term", kind.as_str())
            }
        }
    }
}

impl Error for NodeValidationError {}

#[cfg(test)]
mod tests {
    use super::{Node, NodeKind, NodeValidationError, PersonNames, TermKind};
    use uuid::Uuid;

    #[test]
    fn person_terms_skip_blank_and_duplicate_names() {
        let names = PersonNames::new("Alice Smith")
            .with_alias("alice smith")
            .with_alias("  ")
            .with_short_name("Ali");
        let node = Node::person(Uuid::new_v4(), &names, 1);

        assert_eq!(node.kind, NodeKind::Person);
        assert_eq!(node.terms.len(), 2);
        assert_eq!(node.terms[0].kind, TermKind::FullName);
        assert_eq!(node.terms[1].text, "Ali");
    }

    #[test]
    fn untitled_note_has_no_terms() {
        let node = Node::note(Uuid::new_v4(), None, 3);
        assert_eq!(node.title, "Untitled note");
        assert!(node.terms.is_empty());
        node.validate().expect("untitled notes are valid");
    }

    #[test]
    fn person_without_names_is_rejected() {
        let id = Uuid::new_v4();
        let node = Node::person(id, &PersonNames::new(" "), 1);
        assert_eq!(node.validate(), Err(NodeValidationError::BlankTitle(id)));
    }
}
