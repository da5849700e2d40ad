//! Field discovery: finds candidate inputs and derives a label for each.

use eoka::Page;
use serde::Deserialize;
use tracing::debug;

use super::{js_str, FieldDescriptor, FieldType, FIELD_SELECTOR, MARKER_ATTR};
use crate::Result;

#[derive(Debug, Deserialize)]
struct RawField {
    index: usize,
    label: String,
    declared: Option<String>,
    #[serde(default)]
    property: String,
    role: Option<String>,
    autocomplete: Option<String>,
    tag: String,
}

/// Scans the document in traversal order. Expects `__mailfill` to hold the
/// field selector and marker attribute name.
///
/// Label priority: `label[for=id]`, a `label` inside the nearest `div`,
/// placeholder, aria-label, text of the container's previous sibling, then
/// `Field N`. Inputs without an enclosing `div` are skipped.
const LOCATE_JS: &str = r#"
(() => {
    const { selector, marker } = __mailfill;
    const text = el => ((el && (el.innerText || el.textContent)) || '').trim();

    document.querySelectorAll('[' + marker + ']').forEach(el => el.removeAttribute(marker));

    const results = [];
    document.querySelectorAll(selector).forEach(field => {
        const container = field.closest('div');
        if (!container) return;

        const index = results.length;
        let label = '';
        if (field.id) {
            const forLabel = document.querySelector('label[for=' + JSON.stringify(field.id) + ']');
            if (forLabel) label = text(forLabel);
        }
        if (!label) label = text(container.querySelector('label'));
        if (!label) label = (field.getAttribute('placeholder') || '').trim();
        if (!label) label = (field.getAttribute('aria-label') || '').trim();
        if (!label) label = text(container.previousElementSibling);
        if (!label) label = 'Field ' + (index + 1);

        field.setAttribute(marker, String(index));
        results.push({
            index,
            label,
            declared: field.getAttribute('type'),
            property: field.type || '',
            role: field.getAttribute('role'),
            autocomplete: field.getAttribute('aria-autocomplete'),
            tag: field.tagName.toLowerCase(),
        });
    });

    return JSON.stringify(results);
})()
"#;

/// Find all form fields on the page and tag each with its marker.
pub async fn locate_fields(page: &Page) -> Result<Vec<FieldDescriptor>> {
    let js = format!(
        "var __mailfill = {{ selector: {}, marker: {} }}; {}",
        js_str(FIELD_SELECTOR),
        js_str(MARKER_ATTR),
        LOCATE_JS
    );
    let json_str: String = page.evaluate(&js).await?;
    let fields = parse_scan(&json_str)?;
    debug!("located {} fields", fields.len());
    Ok(fields)
}

fn parse_scan(json_str: &str) -> Result<Vec<FieldDescriptor>> {
    let raw: Vec<RawField> = serde_json::from_str(json_str)
        .map_err(|e| eoka::Error::CdpSimple(format!("field scan parse error: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|r| {
            let field_type = FieldType::classify(
                r.declared.as_deref(),
                r.role.as_deref(),
                r.autocomplete.as_deref(),
                &r.tag,
                &r.property,
            );
            FieldDescriptor {
                index: r.index,
                label: r.label,
                field_type,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scan_builds_descriptors() {
        let json = r#"[
            {"index":0,"label":"Name","declared":"text","property":"text","role":null,"autocomplete":null,"tag":"input"},
            {"index":1,"label":"Country","declared":null,"property":"text","role":"combobox","autocomplete":"list","tag":"input"},
            {"index":2,"label":"Notes","declared":null,"property":"textarea","role":null,"autocomplete":null,"tag":"textarea"},
            {"index":3,"label":"Subscribe","declared":"checkbox","property":"checkbox","role":null,"autocomplete":null,"tag":"input"}
        ]"#;
        let fields = parse_scan(json).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].field_type, FieldType::Text);
        assert_eq!(fields[1].field_type, FieldType::Combobox);
        assert_eq!(fields[2].field_type, FieldType::Textarea);
        assert!(fields[3].field_type.is_checkbox());
        assert!(fields.iter().enumerate().all(|(i, f)| f.index == i));
    }

    #[test]
    fn parse_scan_rejects_garbage() {
        assert!(parse_scan("not json").is_err());
    }
}
