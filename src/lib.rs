//! Client orchestration core for an AI-driven site-generation wizard.
//!
//! This crate is the coordination layer between a presentation surface
//! (forms, galleries, editors — all external) and a backend that runs
//! long-lived investigation and generation jobs over chunked event streams.
//! It owns the stage state machine, survives network drops and page reloads,
//! and keeps persisted state consistent while stream events race user
//! navigation.
//!
//! Data flow: backend bytes → [`stream::StreamIngestor`] → typed frames →
//! [`investigation::InvestigationPipeline`] / [`generation::GenerationPipeline`]
//! → [`advance::AutoAdvanceGuard`] decisions → [`state::StageController`]
//! commits → [`persist::PersistenceStore`] snapshots.

pub mod advance;
pub mod backend;
pub mod errors;
pub mod generation;
pub mod history;
pub mod investigation;
pub mod orchestrator;
pub mod persist;
pub mod stage;
pub mod state;
pub mod stream;

pub use advance::AutoAdvanceGuard;
pub use backend::{Backend, ByteStream, GenerationRequest, HttpBackend, InvestigationRequest};
pub use errors::WizardError;
pub use generation::{GeneratedArtifact, GenerationPipeline};
pub use history::HistoryStack;
pub use investigation::{CategoryJob, InvestigationPipeline, JobStatus};
pub use orchestrator::{Orchestrator, WizardConfig};
pub use persist::{FileBackend, MemoryBackend, PersistenceStore, SnapshotBackend};
pub use stage::WizardStage;
pub use state::{StageController, WizardState};
pub use stream::{ReconnectionManager, StreamFrame, StreamIngestor};
