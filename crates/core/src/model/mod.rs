mod ids;
mod record;
mod state;

pub use ids::{ChecklistId, ChecklistKind, DSA_TOPICS_KEY, ParseKindError};
pub use record::{ProgressRecord, ResourceKey, ResourceKind};
pub use state::{ChecklistCatalog, ChecklistPayload, ProgressState};
