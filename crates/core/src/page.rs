use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single point-in-time snapshot of the controlled page's interactive
/// surface, produced fresh each loop iteration. Never mutated, only
/// superseded by the next snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(default)]
    pub forms: Vec<FormInfo>,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub has_modal: bool,
    #[serde(default)]
    pub modal_hint: Option<String>,
    /// Epoch milliseconds at capture time.
    #[serde(default)]
    pub timestamp: i64,
}

impl PageContext {
    /// Best-effort fallback when the execution surface cannot produce a
    /// snapshot. The loop keeps going with this rather than failing the run.
    pub fn minimal(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    /// Presentation-only ordinal, stable only within one snapshot.
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    /// Must be unique enough to re-target the same element on the next
    /// action; produced by the remote scraping heuristics.
    pub selector: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormInfo {
    pub index: usize,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FormField {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub selector: String,
}
