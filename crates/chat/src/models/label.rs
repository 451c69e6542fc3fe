//! Label model: user-defined tags that group channels

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a label document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A label owned by the current user
///
/// Labels exist independently of channels; a channel refers to a label only
/// through its [`LabelSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub label_id: LabelId,
    pub label_text: String,
}

impl Label {
    pub fn new(label_id: impl Into<LabelId>, label_text: impl Into<String>) -> Self {
        Self {
            label_id: label_id.into(),
            label_text: label_text.into(),
        }
    }
}

/// Set of labels attached to one channel, unique by label id
///
/// Serialized as a list of `{label_id, label_text}` objects, which is the
/// shape the backend uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelSet(BTreeMap<LabelId, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a label. Returns true if the id was not present.
    pub fn insert(&mut self, label: Label) -> bool {
        self.0.insert(label.label_id, label.label_text).is_none()
    }

    /// Remove a label by id, returning it if it was present
    pub fn remove(&mut self, label_id: &LabelId) -> Option<Label> {
        self.0
            .remove_entry(label_id)
            .map(|(label_id, label_text)| Label { label_id, label_text })
    }

    /// Change the text of a label if present. Returns true if anything changed.
    pub fn rename(&mut self, label_id: &LabelId, text: &str) -> bool {
        match self.0.get_mut(label_id) {
            Some(existing) if existing != text => {
                *existing = text.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, label_id: &LabelId) -> Option<Label> {
        self.0.get(label_id).map(|text| Label::new(label_id.clone(), text.clone()))
    }

    pub fn contains(&self, label_id: &LabelId) -> bool {
        self.0.contains_key(label_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Labels in id order
    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        self.0
            .iter()
            .map(|(id, text)| Label::new(id.clone(), text.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &LabelId> {
        self.0.keys()
    }
}

impl From<Vec<Label>> for LabelSet {
    fn from(labels: Vec<Label>) -> Self {
        labels.into_iter().collect()
    }
}

impl From<LabelSet> for Vec<Label> {
    fn from(set: LabelSet) -> Self {
        set.0
            .into_iter()
            .map(|(label_id, label_text)| Label { label_id, label_text })
            .collect()
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}
