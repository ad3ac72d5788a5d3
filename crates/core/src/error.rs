use thiserror::Error;

/// Errors raised by checklist mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChecklistError {
    #[error("resource {key} is not listed on topic {topic}")]
    UnknownResource { topic: String, key: String },
}
