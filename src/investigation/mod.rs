//! The 13-category audit pipeline: job records, event merging, phase
//! records, resume-from-category, and debounced topic-keyed persistence.

mod categories;
mod pipeline;

pub use categories::{index_for_key, CategoryDef, CATEGORIES};
pub use pipeline::{
    CategoryJob, InvestigationPipeline, InvestigationUpdate, JobStatus, PhaseRecord,
    SNAPSHOT_MAX_AGE, SNAPSHOT_DEBOUNCE,
};
