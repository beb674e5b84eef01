//! Normalization of generation completion payloads.
//!
//! Two backend shapes are supported: the manifest + multi-file map, and the
//! legacy single triple of primary content, styles and script. Both collapse
//! into one canonical [`GeneratedArtifact`]. Content fields may arrive
//! transport-encoded as base64; decoding is defensive because some producers
//! set the `encoded` flag on payloads that are already plain text.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::WizardError;

/// Site-wide assets shared by every generated page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedAssets {
    pub styles: String,
    pub script: String,
}

/// Canonical normalized generation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub manifest: Value,
    /// Page path -> decoded content.
    pub files: BTreeMap<String, String>,
    pub shared_assets: SharedAssets,
}

/// Decode one content field.
///
/// When `encoded` is false the value is returned as-is. When true, a
/// content-marker heuristic runs first: content that already looks like
/// markup, styles or script is returned untouched to avoid double-decoding
/// (a documented producer fragility; the flag cannot be fully trusted).
/// Decode failures fall back to the raw string rather than erroring out.
pub fn decode_content(raw: &str, encoded: bool) -> String {
    if !encoded {
        return raw.to_string();
    }
    if looks_like_plain_content(raw) {
        debug!("encoded flag set on plain content, skipping decode");
        return raw.to_string();
    }
    match STANDARD.decode(raw.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!("decoded payload is not UTF-8, keeping raw string");
                raw.to_string()
            }
        },
        Err(err) => {
            warn!(%err, "base64 decode failed, keeping raw string");
            raw.to_string()
        }
    }
}

/// Markup, style and script syntax never survives base64 encoding, so any of
/// these markers means the content is already decoded.
fn looks_like_plain_content(s: &str) -> bool {
    let t = s.trim_start();
    t.starts_with('<') || t.contains("</") || t.contains('{') || t.contains(';')
}

/// Convert a completion payload of either supported shape into the canonical
/// artifact.
pub fn normalize_payload(data: &Value, encoded: bool) -> Result<GeneratedArtifact, WizardError> {
    if let Some(file_map) = data.get("files").and_then(Value::as_object) {
        let mut files = BTreeMap::new();
        for (path, content) in file_map {
            let raw = content.as_str().ok_or_else(|| {
                WizardError::StreamParse(format!("file {path:?} content is not a string"))
            })?;
            files.insert(path.clone(), decode_content(raw, encoded));
        }
        let manifest = data.get("manifest").cloned().unwrap_or_else(|| json!({}));
        return Ok(GeneratedArtifact {
            manifest,
            files,
            shared_assets: shared_assets_from(data, encoded),
        });
    }

    // Legacy shape: one primary document plus shared styles and script.
    if let Some(primary) = data.get("html").or_else(|| data.get("content")) {
        let raw = primary
            .as_str()
            .ok_or_else(|| WizardError::StreamParse("primary content is not a string".into()))?;
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), decode_content(raw, encoded));
        return Ok(GeneratedArtifact {
            manifest: json!({ "pages": ["index.html"] }),
            files,
            shared_assets: shared_assets_from(data, encoded),
        });
    }

    Err(WizardError::StreamParse(
        "unrecognized generation payload shape".into(),
    ))
}

fn shared_assets_from(data: &Value, encoded: bool) -> SharedAssets {
    let shared = data.get("sharedAssets").unwrap_or(data);
    let field = |name: &str| {
        shared
            .get(name)
            .and_then(Value::as_str)
            .map(|raw| decode_content(raw, encoded))
            .unwrap_or_default()
    };
    SharedAssets {
        styles: field("styles"),
        script: field("script"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = "<html><body><h1>Acme</h1></body></html>";
    const CSS: &str = "body { margin: 0; }";
    const JS: &str = "document.title = 'Acme';";

    fn b64(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[test]
    fn unencoded_content_passes_through() {
        assert_eq!(decode_content(HTML, false), HTML);
    }

    #[test]
    fn encoded_content_is_decoded() {
        assert_eq!(decode_content(&b64(HTML), true), HTML);
        assert_eq!(decode_content(&b64(CSS), true), CSS);
    }

    #[test]
    fn heuristic_skips_already_plain_content() {
        // Flag says encoded, content plainly is not: idempotent result.
        for plain in [HTML, CSS, JS] {
            assert_eq!(decode_content(plain, true), plain);
            // Applying the defensive decode twice changes nothing.
            let once = decode_content(plain, true);
            assert_eq!(decode_content(&once, true), plain);
        }
    }

    #[test]
    fn undecodable_content_falls_back_to_raw() {
        let not_base64 = "this is not base64!!!";
        assert_eq!(decode_content(not_base64, true), not_base64);
    }

    #[test]
    fn multi_file_payload_normalizes() {
        let data = json!({
            "manifest": { "pages": ["index.html", "about.html"] },
            "files": {
                "index.html": b64(HTML),
                "about.html": b64("<html><body>About</body></html>"),
            },
            "sharedAssets": { "styles": b64(CSS), "script": b64(JS) }
        });

        let artifact = normalize_payload(&data, true).unwrap();
        assert_eq!(artifact.files.len(), 2);
        assert_eq!(artifact.files["index.html"], HTML);
        assert_eq!(artifact.shared_assets.styles, CSS);
        assert_eq!(artifact.shared_assets.script, JS);
        assert_eq!(artifact.manifest["pages"][1], "about.html");
    }

    #[test]
    fn legacy_triple_payload_normalizes() {
        let data = json!({ "html": HTML, "styles": CSS, "script": JS });

        let artifact = normalize_payload(&data, false).unwrap();
        assert_eq!(artifact.files.len(), 1);
        assert_eq!(artifact.files["index.html"], HTML);
        assert_eq!(artifact.shared_assets.styles, CSS);
        assert_eq!(artifact.manifest["pages"][0], "index.html");
    }

    #[test]
    fn legacy_payload_accepts_content_key() {
        let data = json!({ "content": HTML });
        let artifact = normalize_payload(&data, false).unwrap();
        assert_eq!(artifact.files["index.html"], HTML);
        assert_eq!(artifact.shared_assets, SharedAssets::default());
    }

    #[test]
    fn unknown_shape_is_a_parse_error() {
        let err = normalize_payload(&json!({ "surprise": true }), false).unwrap_err();
        assert!(matches!(err, WizardError::StreamParse(_)));
    }

    #[test]
    fn non_string_file_content_is_a_parse_error() {
        let data = json!({ "files": { "index.html": 42 } });
        assert!(normalize_payload(&data, false).is_err());
    }
}
