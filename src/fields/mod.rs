//! Form field discovery, dropdown probing and value injection.
//!
//! Everything here runs JavaScript in the page through `eoka::Page`. Fields
//! found by [`locate`] are tagged with a marker attribute so that [`inject`]
//! can find the same elements again even if the page re-rendered around them.

pub mod dropdown;
pub mod inject;
pub mod locate;

use eoka::Page;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::Result;

pub use dropdown::{probe_dropdowns, DropdownOptions};
pub use inject::{fill_fields, FieldOutcome, FillReport, ReviewedValue};
pub use locate::locate_fields;

/// Elements considered form fields, in the order they are matched.
pub const FIELD_SELECTOR: &str = r#"input[role="combobox"], input[type="text"], input[type="number"], input[type="checkbox"], textarea, input[aria-autocomplete="list"], input[role="spinbutton"], input[type="date"], input[type="time"]"#;

/// Option elements rendered by custom dropdown widgets (react-select and friends).
pub const OPTION_SELECTOR: &str = r#"[id^="react-select-"][id$="-option"], .css-1jpqh9-option, [class*="option"], .css-1n7v3ny, [role="option"]"#;

/// Attribute written on every located field; its value is the field index.
pub const MARKER_ATTR: &str = "data-mailfill-field";

/// Effective type of a located field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FieldType {
    Text,
    Number,
    Checkbox,
    Date,
    Time,
    Combobox,
    Textarea,
    /// Any other declared type (e.g. `search` on a combobox input).
    Other(String),
}

impl FieldType {
    /// Classify from what the page reports: the declared `type` attribute wins,
    /// then ARIA role hints, then the tag name, then the DOM `type` property.
    pub fn classify(
        declared: Option<&str>,
        role: Option<&str>,
        autocomplete: Option<&str>,
        tag: &str,
        property: &str,
    ) -> Self {
        if let Some(t) = declared.map(str::trim).filter(|t| !t.is_empty()) {
            return Self::from(t.to_ascii_lowercase());
        }
        if role == Some("combobox") || autocomplete == Some("list") {
            return Self::Combobox;
        }
        if role == Some("spinbutton") {
            return Self::Number;
        }
        if tag.eq_ignore_ascii_case("textarea") {
            return Self::Textarea;
        }
        if property.is_empty() {
            Self::from(tag.to_ascii_lowercase())
        } else {
            Self::from(property.to_ascii_lowercase())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
            Self::Time => "time",
            Self::Combobox => "combobox",
            Self::Textarea => "textarea",
            Self::Other(s) => s,
        }
    }

    pub fn is_checkbox(&self) -> bool {
        matches!(self, Self::Checkbox)
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => Self::Text,
            "number" => Self::Number,
            "checkbox" => Self::Checkbox,
            "date" => Self::Date,
            "time" => Self::Time,
            "combobox" => Self::Combobox,
            "textarea" => Self::Textarea,
            _ => Self::Other(s),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Dense zero-based position among discovered fields (document order).
    pub index: usize,
    /// Human-readable label derived from the surrounding markup.
    pub label: String,
    pub field_type: FieldType,
}

impl FieldDescriptor {
    /// CSS selector that re-selects this field through its marker.
    pub fn marker_selector(&self) -> String {
        marker_selector(self.index)
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.label, self.field_type)
    }
}

pub fn marker_selector(index: usize) -> String {
    format!("[{}=\"{}\"]", MARKER_ATTR, index)
}

/// Quote a string as a JavaScript literal.
pub(crate) fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Re-evaluate `js` (which must return a JSON string) every `poll_ms` until
/// `done` accepts the decoded value. `Ok(None)` once `timeout_ms` has passed.
pub(crate) async fn poll_json<T, F>(
    page: &Page,
    js: &str,
    timeout_ms: u64,
    poll_ms: u64,
    done: F,
) -> Result<Option<T>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let json_str: String = page.evaluate(js).await?;
        let value: T = serde_json::from_str(&json_str)
            .map_err(|e| eoka::Error::CdpSimple(format!("poll parse error: {}", e)))?;
        if done(&value) {
            return Ok(Some(value));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        page.wait(poll_ms.max(1)).await;
    }
}
