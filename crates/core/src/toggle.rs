//! Item toggling and topic/resource cascades on a single `ProgressRecord`.
//!
//! Completing a topic that owns resources is a two-phase operation: the
//! request returns a `PendingCompletion` and nothing changes until it is
//! resolved with a `CascadeChoice`. Un-checking a completed topic is always
//! applied directly and clears the topic's resource sub-state.

use crate::error::ChecklistError;
use crate::model::{ProgressRecord, ResourceKey, ResourceKind};

//
// ─── TOPICS ────────────────────────────────────────────────────────────────────
//

/// A resource as listed on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub title: String,
}

impl Resource {
    #[must_use]
    pub fn new(kind: ResourceKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
        }
    }
}

/// A checklist topic together with the resources it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: String,
    resources: Vec<Resource>,
}

impl Topic {
    #[must_use]
    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }

    /// Topic without any resources.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    #[must_use]
    pub fn resource_key(&self, resource: &Resource) -> ResourceKey {
        ResourceKey::new(self.name.as_str(), resource.kind, resource.title.as_str())
    }

    fn resource_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.resources
            .iter()
            .map(|resource| self.resource_key(resource).item_key())
    }

    fn owns(&self, key: &ResourceKey) -> bool {
        key.topic() == self.name
            && self
                .resources
                .iter()
                .any(|res| res.kind == key.kind() && res.title == key.title())
    }
}

//
// ─── STATES ────────────────────────────────────────────────────────────────────
//

/// Completion state of a topic as derived from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    Incomplete,
    /// Topic marked done while at least one of its resources is not.
    CompleteNoResourcesTracked,
    /// Topic and every one of its resources marked done.
    CompleteCascaded,
}

#[must_use]
pub fn topic_state(record: &ProgressRecord, topic: &Topic) -> TopicState {
    if !record.is_done(topic.name()) {
        return TopicState::Incomplete;
    }
    if topic.has_resources() && topic.resource_keys().all(|key| record.is_done(&key)) {
        TopicState::CompleteCascaded
    } else {
        TopicState::CompleteNoResourcesTracked
    }
}

/// How a pending topic completion should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeChoice {
    TopicOnly,
    WithResources,
}

impl CascadeChoice {
    #[must_use]
    pub fn from_cascade(cascade: bool) -> Self {
        if cascade {
            Self::WithResources
        } else {
            Self::TopicOnly
        }
    }
}

/// A topic completion waiting for the user's cascade decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending completion does nothing until resolved"]
pub struct PendingCompletion {
    topic: Topic,
}

impl PendingCompletion {
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Outcome of asking to toggle a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionRequest {
    /// The toggle was applied; carries the topic's new state.
    Applied(TopicState),
    /// The topic has resources and is being completed: confirmation needed.
    NeedsDecision(PendingCompletion),
}

/// Result of toggling a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceToggle {
    pub resource_done: bool,
    pub topic_done: bool,
}

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Flips a plain item and returns its new value. No cascade.
pub fn toggle_item(record: &mut ProgressRecord, item_key: &str) -> bool {
    let done = !record.is_done(item_key);
    record.set(item_key, done);
    done
}

/// First phase of toggling a topic.
///
/// Topics without resources flip immediately. A completed topic is
/// un-checked immediately and its resource keys are removed. Completing a
/// topic with resources leaves the record untouched and returns a
/// `PendingCompletion`.
pub fn request_completion(record: &mut ProgressRecord, topic: &Topic) -> CompletionRequest {
    if !topic.has_resources() {
        toggle_item(record, topic.name());
        return CompletionRequest::Applied(topic_state(record, topic));
    }

    if record.is_done(topic.name()) {
        record.set(topic.name(), false);
        record.clear_resources_of(topic.name());
        return CompletionRequest::Applied(TopicState::Incomplete);
    }

    CompletionRequest::NeedsDecision(PendingCompletion {
        topic: topic.clone(),
    })
}

/// Second phase: applies the user's decision for a pending completion.
pub fn resolve_completion(
    record: &mut ProgressRecord,
    pending: PendingCompletion,
    choice: CascadeChoice,
) -> TopicState {
    let topic = pending.topic;
    record.set(topic.name(), true);
    if choice == CascadeChoice::WithResources {
        for key in topic.resource_keys() {
            record.set(key, true);
        }
    }
    topic_state(record, &topic)
}

/// Flips one resource and recomputes its topic as the AND of all resources.
///
/// # Errors
///
/// Returns `ChecklistError::UnknownResource` if the key does not belong to the topic.
pub fn toggle_resource(
    record: &mut ProgressRecord,
    topic: &Topic,
    resource: &ResourceKey,
) -> Result<ResourceToggle, ChecklistError> {
    if !topic.owns(resource) {
        return Err(ChecklistError::UnknownResource {
            topic: topic.name().to_owned(),
            key: resource.item_key(),
        });
    }

    let resource_done = toggle_item(record, &resource.item_key());
    let topic_done = topic.resource_keys().all(|key| record.is_done(&key));
    record.set(topic.name(), topic_done);

    Ok(ResourceToggle {
        resource_done,
        topic_done,
    })
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
