//! The build/generation job: progress mapped onto fixed build blocks and a
//! completion payload normalized into the canonical artifact.

mod payload;

pub use payload::{decode_content, normalize_payload, GeneratedArtifact, SharedAssets};

use serde::{Deserialize, Serialize};

use crate::errors::{backend_error, WizardError};
use crate::stream::StreamFrame;

/// Ordered generation sub-stages shown while the site builds.
pub const BUILD_BLOCK_NAMES: [&str; 6] = [
    "Structure",
    "Content",
    "Styling",
    "Interactivity",
    "Assets",
    "Packaging",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockStatus {
    Pending,
    Building,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildBlock {
    pub name: &'static str,
    pub status: BlockStatus,
}

/// Drives the generation job from stream frames.
#[derive(Debug)]
pub struct GenerationPipeline {
    blocks: Vec<BuildBlock>,
    artifact: Option<GeneratedArtifact>,
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationPipeline {
    pub fn new() -> Self {
        Self {
            blocks: BUILD_BLOCK_NAMES
                .iter()
                .map(|name| BuildBlock {
                    name,
                    status: BlockStatus::Pending,
                })
                .collect(),
            artifact: None,
        }
    }

    pub fn blocks(&self) -> &[BuildBlock] {
        &self.blocks
    }

    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        self.artifact.as_ref()
    }

    /// Apply one frame. Returns the normalized artifact once the completion
    /// payload arrives; error frames surface as backend errors.
    pub fn apply(&mut self, frame: &StreamFrame) -> Result<Option<GeneratedArtifact>, WizardError> {
        if frame.is_error() {
            let message = frame.error_text().unwrap_or("generation failed");
            return Err(backend_error(message));
        }

        if let Some(progress) = frame.progress {
            self.set_progress(progress);
        }

        if let Some(data) = &frame.data {
            let artifact = normalize_payload(data, frame.encoded.unwrap_or(false))?;
            self.set_progress(100.0);
            self.artifact = Some(artifact.clone());
            return Ok(Some(artifact));
        }
        Ok(None)
    }

    /// Map overall progress onto the block sequence: blocks before the
    /// computed index are complete, the block at it is building, the rest
    /// stay pending.
    fn set_progress(&mut self, progress: f64) {
        let p = progress.clamp(0.0, 100.0);
        let count = self.blocks.len();
        let block_index = ((p / 100.0) * count as f64).floor() as usize;
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.status = if i < block_index {
                BlockStatus::Complete
            } else if i == block_index {
                BlockStatus::Building
            } else {
                BlockStatus::Pending
            };
        }
    }
}
