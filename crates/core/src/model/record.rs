use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const KEY_SEPARATOR: &str = "__";

//
// ─── RESOURCES ─────────────────────────────────────────────────────────────────
//

/// Kind of learning resource attached to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Videos,
    Practice,
    References,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Videos,
        ResourceKind::Practice,
        ResourceKind::References,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Videos => "videos",
            ResourceKind::Practice => "practice",
            ResourceKind::References => "references",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// Compound item key of a resource: `<topic>__<kind>__<title>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    topic: String,
    kind: ResourceKind,
    title: String,
}

impl ResourceKey {
    #[must_use]
    pub fn new(topic: impl Into<String>, kind: ResourceKind, title: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            kind,
            title: title.into(),
        }
    }

    /// Parses a compound item key.
    ///
    /// Topic names may themselves contain `__`; the first separator that is
    /// followed by a known resource kind and another separator wins.
    #[must_use]
    pub fn parse(item_key: &str) -> Option<Self> {
        let mut search_from = 0;
        while let Some(offset) = item_key[search_from..].find(KEY_SEPARATOR) {
            let split = search_from + offset;
            let rest = &item_key[split + KEY_SEPARATOR.len()..];
            if let Some((kind, title)) = rest.split_once(KEY_SEPARATOR)
                && let Some(kind) = ResourceKind::parse(kind)
            {
                return Some(Self::new(&item_key[..split], kind, title));
            }
            search_from = split + KEY_SEPARATOR.len();
        }
        None
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The flat key stored in a `ProgressRecord`.
    #[must_use]
    pub fn item_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.topic,
            self.kind.as_str(),
            self.title
        )
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Completion state of one checklist: item key to done flag.
///
/// Serializes as a plain JSON object, which is both the cache blob and the
/// `items` field sent to the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressRecord(BTreeMap<String, bool>);

impl ProgressRecord {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Stored value for the key, `None` if never set.
    #[must_use]
    pub fn get(&self, item_key: &str) -> Option<bool> {
        self.0.get(item_key).copied()
    }

    /// Whether the item is marked done. Missing keys are not done.
    #[must_use]
    pub fn is_done(&self, item_key: &str) -> bool {
        self.get(item_key).unwrap_or(false)
    }

    pub fn set(&mut self, item_key: impl Into<String>, done: bool) {
        self.0.insert(item_key.into(), done);
    }

    pub fn remove(&mut self, item_key: &str) -> Option<bool> {
        self.0.remove(item_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(key, done)| (key.as_str(), *done))
    }

    /// Resource keys stored under the given topic.
    #[must_use]
    pub fn resource_keys_of(&self, topic: &str) -> Vec<String> {
        self.0
            .keys()
            .filter(|key| ResourceKey::parse(key).is_some_and(|res| res.topic() == topic))
            .cloned()
            .collect()
    }

    /// Removes every resource key stored under the topic; returns how many were removed.
    pub fn clear_resources_of(&mut self, topic: &str) -> usize {
        let keys = self.resource_keys_of(topic);
        for key in &keys {
            self.0.remove(key);
        }
        keys.len()
    }

    /// Number of plain (non-resource) items marked done.
    #[must_use]
    pub fn completed_topics(&self) -> usize {
        self.0
            .iter()
            .filter(|(key, done)| **done && ResourceKey::parse(key).is_none())
            .count()
    }
}

impl FromIterator<(String, bool)> for ProgressRecord {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
