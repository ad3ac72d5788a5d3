use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::{ChecklistId, ChecklistKind};
use crate::model::record::ProgressRecord;

/// One checklist as exchanged with the remote store: `{type, id, items}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistPayload {
    #[serde(rename = "type")]
    pub kind: ChecklistKind,
    pub id: String,
    pub items: ProgressRecord,
}

impl ChecklistPayload {
    #[must_use]
    pub fn from_cache_key(cache_key: &str, items: ProgressRecord) -> Self {
        let checklist = ChecklistId::from_cache_key(cache_key);
        Self {
            kind: checklist.kind(),
            id: checklist.id().to_owned(),
            items,
        }
    }

    #[must_use]
    pub fn checklist(&self) -> ChecklistId {
        ChecklistId::new(self.kind, self.id.clone())
    }
}

/// In-memory snapshot of every checklist, keyed by cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    checklists: BTreeMap<String, ProgressRecord>,
}

impl ProgressState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, cache_key: &str) -> Option<&ProgressRecord> {
        self.checklists.get(cache_key)
    }

    /// Mutable record for the checklist, created empty on first access.
    pub fn record_mut(&mut self, cache_key: &str) -> &mut ProgressRecord {
        self.checklists.entry(cache_key.to_owned()).or_default()
    }

    pub fn insert(&mut self, cache_key: impl Into<String>, record: ProgressRecord) {
        self.checklists.insert(cache_key.into(), record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProgressRecord)> {
        self.checklists.iter().map(|(key, record)| (key.as_str(), record))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checklists.len()
    }

    /// True when no checklist holds any item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checklists.values().all(ProgressRecord::is_empty)
    }

    /// Checklists that carry at least one item.
    pub fn non_empty(&self) -> impl Iterator<Item = (&str, &ProgressRecord)> {
        self.iter().filter(|(_, record)| !record.is_empty())
    }

    /// Remote payload covering every non-empty checklist.
    #[must_use]
    pub fn payloads(&self) -> Vec<ChecklistPayload> {
        self.non_empty()
            .map(|(key, record)| ChecklistPayload::from_cache_key(key, record.clone()))
            .collect()
    }
}

/// Known checklists that exist before any progress is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecklistCatalog {
    languages: Vec<String>,
    exams: Vec<String>,
}

impl ChecklistCatalog {
    #[must_use]
    pub fn new(languages: Vec<String>, exams: Vec<String>) -> Self {
        Self { languages, exams }
    }

    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    #[must_use]
    pub fn exams(&self) -> &[String] {
        &self.exams
    }

    /// Cache keys of every catalogued checklist, DSA topic list included.
    #[must_use]
    pub fn cache_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.languages.len() * 2 + self.exams.len() + 1);
        for language in &self.languages {
            keys.push(ChecklistId::language_dsa(language.as_str()).cache_key());
            keys.push(ChecklistId::language_dev(language.as_str()).cache_key());
        }
        keys.push(ChecklistId::dsa_topics().cache_key());
        for exam in &self.exams {
            keys.push(ChecklistId::examination(exam.as_str()).cache_key());
        }
        keys
    }
}
