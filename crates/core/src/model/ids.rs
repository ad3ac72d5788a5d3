use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cache key and id of the language-agnostic DSA topic list.
pub const DSA_TOPICS_KEY: &str = "dsa";

const LANGUAGE_DSA_SUFFIX: &str = "_dsa";
const LANGUAGE_DEV_SUFFIX: &str = "_dev";

/// The four families of checklists progress is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKind {
    /// Per-language DSA mastery track.
    LanguageDsa,
    /// Per-language development mastery track.
    LanguageDev,
    /// Language-agnostic DSA topic list.
    DsaTopics,
    /// One examination syllabus.
    Examination,
}

impl ChecklistKind {
    pub const ALL: [ChecklistKind; 4] = [
        ChecklistKind::LanguageDsa,
        ChecklistKind::LanguageDev,
        ChecklistKind::DsaTopics,
        ChecklistKind::Examination,
    ];

    /// Wire name used by the remote API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChecklistKind::LanguageDsa => "language_dsa",
            ChecklistKind::LanguageDev => "language_dev",
            ChecklistKind::DsaTopics => "dsa_topics",
            ChecklistKind::Examination => "examination",
        }
    }
}

impl fmt::Display for ChecklistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured identity of one checklist.
///
/// Every checklist maps to exactly one flat cache key and back:
///
/// | cache key    | kind           | id         |
/// |--------------|----------------|------------|
/// | `dsa`        | `DsaTopics`    | `dsa`      |
/// | `python_dsa` | `LanguageDsa`  | `python`   |
/// | `python_dev` | `LanguageDev`  | `python`   |
/// | `gate`       | `Examination`  | `gate`     |
///
/// Ids are not validated against any list of known languages or exams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChecklistId {
    #[serde(rename = "type")]
    kind: ChecklistKind,
    id: String,
}

impl ChecklistId {
    #[must_use]
    pub fn new(kind: ChecklistKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn language_dsa(language: impl Into<String>) -> Self {
        Self::new(ChecklistKind::LanguageDsa, language)
    }

    #[must_use]
    pub fn language_dev(language: impl Into<String>) -> Self {
        Self::new(ChecklistKind::LanguageDev, language)
    }

    #[must_use]
    pub fn dsa_topics() -> Self {
        Self::new(ChecklistKind::DsaTopics, DSA_TOPICS_KEY)
    }

    #[must_use]
    pub fn examination(exam: impl Into<String>) -> Self {
        Self::new(ChecklistKind::Examination, exam)
    }

    /// Resolves a flat cache key into its checklist identity.
    #[must_use]
    pub fn from_cache_key(cache_key: &str) -> Self {
        if cache_key == DSA_TOPICS_KEY {
            return Self::dsa_topics();
        }
        if let Some(language) = cache_key.strip_suffix(LANGUAGE_DSA_SUFFIX) {
            return Self::language_dsa(language);
        }
        if let Some(language) = cache_key.strip_suffix(LANGUAGE_DEV_SUFFIX) {
            return Self::language_dev(language);
        }
        Self::examination(cache_key)
    }

    /// Flat cache key for this checklist.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self.kind {
            ChecklistKind::LanguageDsa => format!("{}{LANGUAGE_DSA_SUFFIX}", self.id),
            ChecklistKind::LanguageDev => format!("{}{LANGUAGE_DEV_SUFFIX}", self.id),
            ChecklistKind::DsaTopics => DSA_TOPICS_KEY.to_owned(),
            ChecklistKind::Examination => self.id.clone(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChecklistKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for ChecklistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing a checklist kind from its wire name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError {
    raw: String,
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown checklist type: {}", self.raw)
    }
}

impl std::error::Error for ParseKindError {}

impl FromStr for ChecklistKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChecklistKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseKindError { raw: s.to_owned() })
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
