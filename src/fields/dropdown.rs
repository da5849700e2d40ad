//! Custom dropdown probing: open each widget, read the options it renders.

use eoka::Page;
use serde::Serialize;
use tracing::{debug, info};

use super::{js_str, poll_json, OPTION_SELECTOR};
use crate::config::Timing;
use crate::Result;

/// Dropdown widgets: native comboboxes plus known framework class names.
pub const DROPDOWN_SELECTOR: &str = r#"input[role="combobox"], .sc-guJBdh.sc-fTFjTM.cxFpzr"#;

const DROPDOWN_ATTR: &str = "data-mailfill-dropdown";

/// Options read from one dropdown widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropdownOptions {
    /// Widget id, name, or `Dropdown N`.
    pub label: String,
    pub options: Vec<String>,
}

/// Tags every widget and returns its display name, in document order.
const ENUMERATE_JS: &str = r#"
(() => {
    const { selector, attr } = __mailfill;
    document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr));
    const names = [];
    document.querySelectorAll(selector).forEach((el, i) => {
        el.setAttribute(attr, String(i));
        names.push(el.id || el.getAttribute('name') || ('Dropdown ' + (i + 1)));
    });
    return JSON.stringify(names);
})()
"#;

/// Focuses the widget's input and replays the pointer sequence that opens it.
const OPEN_JS: &str = r#"
(() => {
    const { target } = __mailfill;
    const el = document.querySelector(target);
    if (!el) return false;
    if (el.tagName.toLowerCase() === 'input') {
        el.focus();
    } else {
        const input = el.closest('div')?.querySelector('input');
        if (input) input.focus();
    }
    for (const type of ['mouseover', 'mousedown', 'mouseup', 'click']) {
        el.dispatchEvent(new MouseEvent(type, { bubbles: true }));
    }
    return true;
})()
"#;

/// Trimmed text of every visible option element.
const OPTIONS_JS: &str = r#"
(() => {
    const { options } = __mailfill;
    const texts = [];
    document.querySelectorAll(options).forEach(el => {
        const rect = el.getBoundingClientRect();
        if (rect.width < 1 || rect.height < 1) return;
        const t = (el.textContent || '').trim();
        if (t) texts.push(t);
    });
    return JSON.stringify(texts);
})()
"#;

/// Open every dropdown on the page in turn and collect its options.
///
/// Widgets that render no options within `timing.dropdown_timeout_ms` are
/// left out of the result.
pub async fn probe_dropdowns(page: &Page, timing: &Timing) -> Result<Vec<DropdownOptions>> {
    let js = format!(
        "var __mailfill = {{ selector: {}, attr: {} }}; {}",
        js_str(DROPDOWN_SELECTOR),
        js_str(DROPDOWN_ATTR),
        ENUMERATE_JS
    );
    let json_str: String = page.evaluate(&js).await?;
    let names: Vec<String> = serde_json::from_str(&json_str)
        .map_err(|e| eoka::Error::CdpSimple(format!("dropdown scan parse error: {}", e)))?;
    info!("probing {} dropdowns", names.len());

    let options_js = format!(
        "var __mailfill = {{ options: {} }}; {}",
        js_str(OPTION_SELECTOR),
        OPTIONS_JS
    );

    let mut found = Vec::new();
    for (i, label) in names.into_iter().enumerate() {
        let target = format!("[{}=\"{}\"]", DROPDOWN_ATTR, i);
        let open_js = format!(
            "var __mailfill = {{ target: {} }}; {}",
            js_str(&target),
            OPEN_JS
        );
        let opened: bool = page.evaluate(&open_js).await?;
        if !opened {
            debug!("dropdown '{}' disappeared before opening", label);
            continue;
        }

        let options: Option<Vec<String>> = poll_json(
            page,
            &options_js,
            timing.dropdown_timeout_ms,
            timing.poll_ms,
            |texts: &Vec<String>| !texts.is_empty(),
        )
        .await?;

        page.execute("document.body.click()").await?;
        // Let the list close so the next widget doesn't read stale options
        let _: Option<Vec<String>> = poll_json(
            page,
            &options_js,
            timing.dropdown_timeout_ms,
            timing.poll_ms,
            |texts: &Vec<String>| texts.is_empty(),
        )
        .await?;

        match options {
            Some(options) => {
                debug!("dropdown '{}': {} options", label, options.len());
                found.push(DropdownOptions { label, options });
            }
            None => debug!("dropdown '{}': no options rendered", label),
        }
    }

    Ok(found)
}
