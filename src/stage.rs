//! The fixed wizard stage enumeration and its canonical ordering.
//!
//! Stages form a fixed linear flow: package selection, template selection,
//! the 13 audit-category stages in canonical order, then build, review and
//! final. `Completed` sits outside the linear flow as the terminal marker for
//! a project that has been finished and archived.

use serde::{Deserialize, Serialize};

/// One value of the fixed wizard state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStage {
    PackageSelection,
    TemplateSelection,
    // The 13 audit-category stages, canonical order.
    BusinessOverview,
    TargetAudience,
    BrandVoice,
    CompetitorScan,
    KeywordResearch,
    ContentStructure,
    OnPageSeo,
    TechnicalSeo,
    LocalSeo,
    LinkProfile,
    SocialPresence,
    Imagery,
    CallsToAction,
    Build,
    Review,
    Final,
    /// Terminal marker for an archived, finished project. Not part of the
    /// linear flow; a snapshot carrying it forces a restart on restore.
    Completed,
}

/// Number of audit categories. Fixed by the backend contract.
pub const CATEGORY_COUNT: usize = 13;

/// The linear wizard flow, in order. `Completed` is excluded: nothing
/// advances into or out of it through normal navigation.
pub const CANONICAL_ORDER: [WizardStage; 18] = [
    WizardStage::PackageSelection,
    WizardStage::TemplateSelection,
    WizardStage::BusinessOverview,
    WizardStage::TargetAudience,
    WizardStage::BrandVoice,
    WizardStage::CompetitorScan,
    WizardStage::KeywordResearch,
    WizardStage::ContentStructure,
    WizardStage::OnPageSeo,
    WizardStage::TechnicalSeo,
    WizardStage::LocalSeo,
    WizardStage::LinkProfile,
    WizardStage::SocialPresence,
    WizardStage::Imagery,
    WizardStage::CallsToAction,
    WizardStage::Build,
    WizardStage::Review,
    WizardStage::Final,
];

/// Index of the first category stage within [`CANONICAL_ORDER`].
const FIRST_CATEGORY_POS: usize = 2;

impl WizardStage {
    /// The stage the wizard starts in.
    pub fn initial() -> Self {
        WizardStage::PackageSelection
    }

    /// Position in the canonical linear flow, if part of it.
    pub fn order_index(&self) -> Option<usize> {
        CANONICAL_ORDER.iter().position(|s| s == self)
    }

    /// Next stage in the canonical flow, if any.
    pub fn next_in_order(&self) -> Option<WizardStage> {
        let i = self.order_index()?;
        CANONICAL_ORDER.get(i + 1).copied()
    }

    /// Previous stage in the canonical flow, if any. Used as the back()
    /// fallback when explicit history has been cleared.
    pub fn prev_in_order(&self) -> Option<WizardStage> {
        let i = self.order_index()?;
        i.checked_sub(1).map(|p| CANONICAL_ORDER[p])
    }

    /// Terminal stages must never be silently reset or cleared.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardStage::Final | WizardStage::Completed)
    }

    /// Whether this is one of the 13 audit-category stages.
    pub fn is_category(&self) -> bool {
        self.category_index().is_some()
    }

    /// Canonical category index (0..=12) for category stages.
    pub fn category_index(&self) -> Option<usize> {
        let i = self.order_index()?;
        let rel = i.checked_sub(FIRST_CATEGORY_POS)?;
        (rel < CATEGORY_COUNT).then_some(rel)
    }

    /// Category stage for a canonical index (0..=12).
    pub fn for_category(index: usize) -> Option<WizardStage> {
        (index < CATEGORY_COUNT).then(|| CANONICAL_ORDER[FIRST_CATEGORY_POS + index])
    }
}
