//! The 13 audit categories, fixed canonical order.
//!
//! Each entry maps the backend's category key to a display name and the
//! wizard stage the category runs under. The order here is the order the
//! backend reports `categoryIndex` in and must not change.

use crate::stage::{WizardStage, CATEGORY_COUNT};

#[derive(Debug, Clone, Copy)]
pub struct CategoryDef {
    pub key: &'static str,
    pub name: &'static str,
    pub stage: WizardStage,
}

pub const CATEGORIES: [CategoryDef; CATEGORY_COUNT] = [
    CategoryDef {
        key: "business-overview",
        name: "Business overview",
        stage: WizardStage::BusinessOverview,
    },
    CategoryDef {
        key: "target-audience",
        name: "Target audience",
        stage: WizardStage::TargetAudience,
    },
    CategoryDef {
        key: "brand-voice",
        name: "Brand voice",
        stage: WizardStage::BrandVoice,
    },
    CategoryDef {
        key: "competitor-scan",
        name: "Competitor scan",
        stage: WizardStage::CompetitorScan,
    },
    CategoryDef {
        key: "keyword-research",
        name: "Keyword research",
        stage: WizardStage::KeywordResearch,
    },
    CategoryDef {
        key: "content-structure",
        name: "Content structure",
        stage: WizardStage::ContentStructure,
    },
    CategoryDef {
        key: "on-page-seo",
        name: "On-page SEO",
        stage: WizardStage::OnPageSeo,
    },
    CategoryDef {
        key: "technical-seo",
        name: "Technical SEO",
        stage: WizardStage::TechnicalSeo,
    },
    CategoryDef {
        key: "local-seo",
        name: "Local SEO",
        stage: WizardStage::LocalSeo,
    },
    CategoryDef {
        key: "link-profile",
        name: "Link profile",
        stage: WizardStage::LinkProfile,
    },
    CategoryDef {
        key: "social-presence",
        name: "Social presence",
        stage: WizardStage::SocialPresence,
    },
    CategoryDef {
        key: "imagery",
        name: "Imagery",
        stage: WizardStage::Imagery,
    },
    CategoryDef {
        key: "calls-to-action",
        name: "Calls to action",
        stage: WizardStage::CallsToAction,
    },
];

/// Canonical index for a backend category key.
pub fn index_for_key(key: &str) -> Option<usize> {
    CATEGORIES.iter().position(|c| c.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_table_matches_stage_mapping() {
        assert_eq!(CATEGORIES.len(), CATEGORY_COUNT);
        for (i, def) in CATEGORIES.iter().enumerate() {
            assert_eq!(def.stage.category_index(), Some(i), "entry {}", def.key);
            assert_eq!(WizardStage::for_category(i), Some(def.stage));
        }
    }

    #[test]
    fn keys_are_unique_and_resolvable() {
        for (i, def) in CATEGORIES.iter().enumerate() {
            assert_eq!(index_for_key(def.key), Some(i));
        }
        assert_eq!(index_for_key("no-such-category"), None);
    }
}
