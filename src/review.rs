//! Human review of extracted values before they are written to the page.

use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fields::{FieldDescriptor, FieldType, ReviewedValue};
use crate::parse::{ExtractedFields, FieldValue};
use crate::Result;

/// One editable row: a field and the value that will be written into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub index: usize,
    pub label: String,
    pub field_type: FieldType,
    /// Checkbox rows hold `"true"` or `"false"`.
    pub value: String,
}

impl ReviewRow {
    pub fn is_checked(&self) -> bool {
        self.value.eq_ignore_ascii_case("true")
    }
}

/// One row per field, in field order.
pub fn build_rows(fields: &[FieldDescriptor], extracted: &ExtractedFields) -> Vec<ReviewRow> {
    fields
        .iter()
        .map(|field| {
            let value = extracted.get(field.index);
            let value = if field.field_type.is_checkbox() {
                checkbox_state(value).to_string()
            } else {
                value.map(ToString::to_string).unwrap_or_default()
            };
            ReviewRow {
                index: field.index,
                label: field.label.clone(),
                field_type: field.field_type.clone(),
                value,
            }
        })
        .collect()
}

fn checkbox_state(value: Option<&FieldValue>) -> bool {
    match value {
        Some(FieldValue::Bool(b)) => *b,
        Some(FieldValue::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Values to inject, each tied to its field index.
pub fn reviewed_values(rows: &[ReviewRow]) -> Vec<ReviewedValue> {
    rows.iter()
        .map(|row| ReviewedValue::new(row.index, row.value.clone()))
        .collect()
}

fn display_value(row: &ReviewRow) -> String {
    if row.field_type.is_checkbox() {
        let mark = if row.is_checked() { "[x]" } else { "[ ]" };
        mark.to_string()
    } else {
        row.value.clone()
    }
}

/// Render rows as an aligned table.
pub fn render_table(rows: &[ReviewRow]) -> String {
    let label_w = rows
        .iter()
        .map(|r| r.label.chars().count())
        .max()
        .unwrap_or(0)
        .max("Field".len());
    let type_w = rows
        .iter()
        .map(|r| r.field_type.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Type".len());

    let mut out = format!(
        "{:>4}  {:<label_w$}  {:<type_w$}  Value\n",
        "#",
        "Field",
        "Type",
        label_w = label_w,
        type_w = type_w
    );
    for row in rows {
        out.push_str(&format!(
            "{:>4}  {:<label_w$}  {:<type_w$}  {}\n",
            row.index,
            row.label,
            row.field_type.as_str(),
            display_value(row),
            label_w = label_w,
            type_w = type_w
        ));
    }
    out
}

/// Prompt for each row in turn. An empty line keeps the current value; input
/// ending early keeps the remaining rows unchanged.
///
/// Checkbox rows accept `y`/`yes`/`true`/`x`/`1` as checked and anything else
/// as unchecked.
pub fn edit_rows<R: BufRead, W: Write>(
    rows: &mut [ReviewRow],
    mut input: R,
    mut output: W,
) -> std::io::Result<()> {
    for row in rows.iter_mut() {
        write!(
            output,
            "[{}] {} ({}) [{}]: ",
            row.index,
            row.label,
            row.field_type,
            display_value(row)
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        row.value = if row.field_type.is_checkbox() {
            let checked = matches!(
                line.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "x" | "1"
            );
            checked.to_string()
        } else {
            line.to_string()
        };
    }
    Ok(())
}

/// Write rows to a YAML review file.
pub fn save_rows<P: AsRef<Path>>(path: P, rows: &[ReviewRow]) -> Result<()> {
    let yaml = serde_yaml::to_string(rows)?;
    std::fs::write(path.as_ref(), yaml)?;
    Ok(())
}

/// Read rows back from a YAML review file.
pub fn load_rows<P: AsRef<Path>>(path: P) -> Result<Vec<ReviewRow>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_yaml::from_str(&content)?)
}
