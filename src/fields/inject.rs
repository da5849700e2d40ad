//! Writes reviewed values back into the page.
//!
//! Each field is re-selected through the marker left by the locator, focused
//! by clicking its container, written through the native value setter, and
//! announced with `input`/`change` events so reactive frameworks pick it up.

use std::fmt;

use eoka::Page;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{js_str, marker_selector, poll_json, OPTION_SELECTOR};
use crate::config::Timing;
use crate::Result;

const SEEN_ATTR: &str = "data-mailfill-seen";

/// A reviewed value bound to the field index it was extracted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedValue {
    pub index: usize,
    pub value: String,
}

impl ReviewedValue {
    pub fn new(index: usize, value: impl Into<String>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }
}

/// What happened to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "option", rename_all = "snake_case")]
pub enum FieldOutcome {
    Filled,
    /// Value written and a dropdown option was clicked to confirm it.
    FilledWithOption(String),
    /// The marked element is no longer in the page.
    Missing,
    /// Value written into a combobox, but no option appeared to confirm it.
    OptionTimeout,
}

impl FieldOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Filled | Self::FilledWithOption(_))
    }
}

/// Outcomes for every field that was attempted, in attempt order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FillReport {
    pub fields: Vec<(usize, FieldOutcome)>,
}

impl FillReport {
    pub fn filled(&self) -> usize {
        self.fields.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.fields.len() - self.filled()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for FillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} filled", self.filled())?;
        if self.failed() > 0 {
            let missing = self
                .fields
                .iter()
                .filter(|(_, o)| *o == FieldOutcome::Missing)
                .count();
            let unconfirmed = self.failed() - missing;
            write!(f, ", {} missing, {} unconfirmed", missing, unconfirmed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Prepared {
    found: bool,
    #[serde(default)]
    checkbox: bool,
    #[serde(default)]
    combobox: bool,
}

/// Marks already-rendered options as seen, then clicks the field's container.
const PREPARE_JS: &str = r#"
(() => {
    const { target, options, seen } = __mailfill;
    const el = document.querySelector(target);
    if (!el) return JSON.stringify({ found: false });

    document.querySelectorAll('[' + seen + ']').forEach(o => o.removeAttribute(seen));
    document.querySelectorAll(options).forEach(o => o.setAttribute(seen, ''));

    const container = el.closest('div') || el;
    container.click();
    return JSON.stringify({
        found: true,
        checkbox: el.type === 'checkbox',
        combobox: el.getAttribute('role') === 'combobox' || el.getAttribute('aria-autocomplete') === 'list',
    });
})()
"#;

/// Sets the value (or checked state) and fires `input` + `change`.
const WRITE_JS: &str = r#"
(() => {
    const { target, value } = __mailfill;
    const el = document.querySelector(target);
    if (!el) return false;
    if (el.type === 'checkbox') {
        el.checked = value.toLowerCase() === 'true';
    } else {
        const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
        setter.call(el, value);
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
})()
"#;

/// Clicks the first visible option rendered since `PREPARE_JS` ran.
const CONFIRM_OPTION_JS: &str = r#"
(() => {
    const { options, seen } = __mailfill;
    for (const o of document.querySelectorAll(options)) {
        if (o.hasAttribute(seen)) continue;
        const rect = o.getBoundingClientRect();
        if (rect.width < 1 || rect.height < 1) continue;
        const text = (o.textContent || '').trim();
        o.click();
        return JSON.stringify(text);
    }
    return JSON.stringify(null);
})()
"#;

/// Write each reviewed value into its field.
pub async fn fill_fields(
    page: &Page,
    values: &[ReviewedValue],
    timing: &Timing,
) -> Result<FillReport> {
    let mut report = FillReport::default();
    let confirm_js = format!(
        "var __mailfill = {{ options: {}, seen: {} }}; {}",
        js_str(OPTION_SELECTOR),
        js_str(SEEN_ATTR),
        CONFIRM_OPTION_JS
    );

    let filled = fill_all(page, values, timing, &confirm_js, &mut report).await;
    let cleared = clear_seen(page).await;
    filled?;
    cleared?;

    info!("fill complete: {}", report);
    Ok(report)
}

async fn fill_all(
    page: &Page,
    values: &[ReviewedValue],
    timing: &Timing,
    confirm_js: &str,
    report: &mut FillReport,
) -> Result<()> {
    for reviewed in values {
        let outcome = fill_one(page, reviewed, timing, confirm_js).await?;
        match outcome {
            FieldOutcome::Missing => warn!("field [{}] is no longer on the page", reviewed.index),
            FieldOutcome::OptionTimeout => warn!(
                "field [{}]: no dropdown option appeared within {}ms",
                reviewed.index, timing.option_timeout_ms
            ),
            _ => debug!("field [{}]: {:?}", reviewed.index, outcome),
        }
        report.fields.push((reviewed.index, outcome));
    }
    Ok(())
}

/// Drops every seen tag. Called after a fill whether or not it succeeded.
async fn clear_seen(page: &Page) -> Result<()> {
    page.execute(&format!(
        "document.querySelectorAll('[{}]').forEach(o => o.removeAttribute('{}'))",
        SEEN_ATTR, SEEN_ATTR
    ))
    .await?;
    Ok(())
}

async fn fill_one(
    page: &Page,
    reviewed: &ReviewedValue,
    timing: &Timing,
    confirm_js: &str,
) -> Result<FieldOutcome> {
    let target = marker_selector(reviewed.index);

    let prepare_js = format!(
        "var __mailfill = {{ target: {}, options: {}, seen: {} }}; {}",
        js_str(&target),
        js_str(OPTION_SELECTOR),
        js_str(SEEN_ATTR),
        PREPARE_JS
    );
    let json_str: String = page.evaluate(&prepare_js).await?;
    let prepared: Prepared = serde_json::from_str(&json_str)
        .map_err(|e| eoka::Error::CdpSimple(format!("fill prepare parse error: {}", e)))?;
    if !prepared.found {
        return Ok(FieldOutcome::Missing);
    }

    page.wait(timing.settle_ms).await;

    let write_js = format!(
        "var __mailfill = {{ target: {}, value: {} }}; {}",
        js_str(&target),
        js_str(&reviewed.value),
        WRITE_JS
    );
    let written: bool = page.evaluate(&write_js).await?;
    if !written {
        return Ok(FieldOutcome::Missing);
    }
    debug!("typed {:?} into field [{}]", reviewed.value, reviewed.index);

    if prepared.checkbox {
        return Ok(FieldOutcome::Filled);
    }

    let clicked: Option<Option<String>> = poll_json(
        page,
        confirm_js,
        timing.option_timeout_ms,
        timing.poll_ms,
        |text: &Option<String>| text.is_some(),
    )
    .await?;

    Ok(match clicked.flatten() {
        Some(text) => FieldOutcome::FilledWithOption(text),
        None if prepared.combobox => FieldOutcome::OptionTimeout,
        None => FieldOutcome::Filled,
    })
}
