//! Wire model for the backend's newline-delimited event stream.
//!
//! Each meaningful line is the fixed `data: ` token followed by a JSON body.
//! A single frame struct covers both job kinds: investigation events use
//! `categoryIndex`/`categoryProgress`/`checkScores`, generation events use
//! `progress` and the terminal `data` payload.

mod ingest;
mod reconnect;

pub use ingest::{IngestItem, StreamIngestor, FRAME_PREFIX};
pub use reconnect::{BackoffConfig, Connectivity, ReconnectionManager};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded event frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamFrame {
    /// Category or phase identifier.
    pub stage: Option<String>,
    /// Overall progress, 0..=100. Drives the generation build blocks.
    pub progress: Option<f64>,
    /// Canonical audit category index, 0..=12.
    pub category_index: Option<usize>,
    /// Per-category progress, 0..=100.
    pub category_progress: Option<f64>,
    /// Per-check scores to merge into the category's score map.
    pub check_scores: Option<BTreeMap<String, f64>>,
    /// Present when the event is error-flagged.
    pub error: Option<String>,
    /// Human-readable detail accompanying an error or milestone.
    pub message: Option<String>,
    /// Terminal payload; shape depends on the stage.
    pub data: Option<Value>,
    /// Signals that `data` content fields require byte-decoding.
    pub encoded: Option<bool>,
}

impl StreamFrame {
    /// Whether this frame signals a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Best human-readable failure text for an error-flagged frame.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref()?;
        self.message.as_deref().or(self.error.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_investigation_progress_frame() {
        let json = r#"{"stage":"keyword-research","categoryIndex":4,"categoryProgress":62.5,"checkScores":{"density":71.0,"intent":88.0}}"#;
        let frame: StreamFrame = serde_json::from_str(json).unwrap();

        assert_eq!(frame.stage.as_deref(), Some("keyword-research"));
        assert_eq!(frame.category_index, Some(4));
        assert_eq!(frame.category_progress, Some(62.5));
        let scores = frame.check_scores.as_ref().unwrap();
        assert_eq!(scores.get("density"), Some(&71.0));
        assert!(!frame.is_error());
    }

    #[test]
    fn parses_generation_completion_frame() {
        let json = r#"{"stage":"complete","progress":100,"data":{"html":"<html></html>"},"encoded":false}"#;
        let frame: StreamFrame = serde_json::from_str(json).unwrap();

        assert_eq!(frame.progress, Some(100.0));
        assert_eq!(frame.encoded, Some(false));
        assert!(frame.data.is_some());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"stage":"imagery","categoryIndex":11,"categoryProgress":10,"serverTime":"2026-08-30T00:00:00Z"}"#;
        let frame: StreamFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.category_index, Some(11));
    }

    #[test]
    fn error_text_prefers_message() {
        let frame = StreamFrame {
            error: Some("E_UPSTREAM".into()),
            message: Some("upstream crawler unavailable".into()),
            ..StreamFrame::default()
        };
        assert!(frame.is_error());
        assert_eq!(frame.error_text(), Some("upstream crawler unavailable"));

        let bare = StreamFrame {
            error: Some("E_UPSTREAM".into()),
            ..StreamFrame::default()
        };
        assert_eq!(bare.error_text(), Some("E_UPSTREAM"));

        let ok = StreamFrame::default();
        assert_eq!(ok.error_text(), None);
    }
}
