//! Turns a completion reply into per-field values.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::completion::CompletionResponse;
use crate::fields::FieldDescriptor;
use crate::{Error, Result};

/// A value the model extracted for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Number(serde_json::Number),
    /// The model could not determine a value.
    Null,
}

impl FieldValue {
    fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::Null => Self::Null,
            other => Self::String(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    /// Text shown to the reviewer. Null renders empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Null => Ok(()),
        }
    }
}

/// Extracted values keyed by field index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    values: BTreeMap<usize, FieldValue>,
}

impl ExtractedFields {
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(&index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Textual answer carried by the reply envelope.
pub fn payload_text(response: &CompletionResponse) -> Result<&str> {
    let text = match response {
        CompletionResponse::Chat(body) => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        CompletionResponse::Assistant(message) => message
            .pointer("/content/0/text/value")
            .and_then(Value::as_str),
    };
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(Error::Parse("invalid or empty response".into())),
    }
}

/// Parse the reply and bind its values to `fields`.
///
/// Each field is looked up by its bracketed index (`"[3]"`), then its label.
/// Fields with no matching key are left out.
pub fn parse_response(
    response: &CompletionResponse,
    fields: &[FieldDescriptor],
) -> Result<ExtractedFields> {
    let text = payload_text(response)?;
    let object: Map<String, Value> = match serde_json::from_str(text) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(Error::Parse(format!(
                "failed to parse response: expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
        Err(e) => return Err(Error::Parse(format!("failed to parse response: {}", e))),
    };

    let mut extracted = ExtractedFields::default();
    for field in fields {
        let value = object
            .get(&format!("[{}]", field.index))
            .or_else(|| object.get(&field.label));
        if let Some(value) = value {
            extracted
                .values
                .insert(field.index, FieldValue::from_json(value.clone()));
        }
    }

    debug!(
        "extracted {} of {} fields from reply",
        extracted.len(),
        fields.len()
    );
    Ok(extracted)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;
    use serde_json::json;

    fn field(index: usize, label: &str, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            index,
            label: label.into(),
            field_type,
        }
    }

    fn chat(content: &str) -> CompletionResponse {
        CompletionResponse::Chat(json!({ "choices": [{ "message": { "content": content } }] }))
    }

    #[test]
    fn chat_reply_binds_by_label() {
        let fields = vec![field(0, "Attendee", FieldType::Text)];
        let extracted = parse_response(&chat(r#"{"Attendee":"Bob"}"#), &fields).unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::String("Bob".into())));
    }

    #[test]
    fn assistant_reply_reads_text_value() {
        let reply = CompletionResponse::Assistant(json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": { "value": "{\"Name\": \"Alice\"}" } }]
        }));
        let extracted = parse_response(&reply, &[field(0, "Name", FieldType::Text)]).unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::String("Alice".into())));
    }

    #[test]
    fn index_keys_beat_shared_labels() {
        let fields = vec![
            field(0, "Name", FieldType::Text),
            field(1, "Name", FieldType::Text),
        ];
        let extracted =
            parse_response(&chat(r#"{"[0]":"Alice","[1]":"Bob","Name":"Carol"}"#), &fields).unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::String("Alice".into())));
        assert_eq!(extracted.get(1), Some(&FieldValue::String("Bob".into())));
    }

    #[test]
    fn numeric_labels_are_not_read_as_indices() {
        let fields = vec![
            field(0, "1", FieldType::Text),
            field(1, "2", FieldType::Text),
            field(2, "Notes", FieldType::Text),
        ];
        let extracted = parse_response(
            &chat(r#"{"1":"apples","2":"pears","Notes":"deliver friday"}"#),
            &fields,
        )
        .unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::String("apples".into())));
        assert_eq!(extracted.get(1), Some(&FieldValue::String("pears".into())));
        assert_eq!(
            extracted.get(2),
            Some(&FieldValue::String("deliver friday".into()))
        );
    }

    #[test]
    fn bracketed_index_key_is_not_consumed_by_label_lookup() {
        let fields = vec![
            field(0, "[1]", FieldType::Text),
            field(1, "City", FieldType::Text),
        ];
        let extracted = parse_response(&chat(r#"{"[1]":"Oslo"}"#), &fields).unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::String("Oslo".into())));
        assert_eq!(extracted.get(1), Some(&FieldValue::String("Oslo".into())));
    }

    #[test]
    fn shared_label_without_index_keys_applies_to_both() {
        let fields = vec![
            field(0, "Name", FieldType::Text),
            field(1, "Name", FieldType::Text),
        ];
        let extracted = parse_response(&chat(r#"{"Name":"Carol"}"#), &fields).unwrap();
        assert_eq!(extracted.get(0), extracted.get(1));
        assert_eq!(extracted.len(), 2);
    }

    #[test]
    fn value_shapes_are_preserved() {
        let fields = vec![
            field(0, "Agree", FieldType::Checkbox),
            field(1, "Guests", FieldType::Number),
            field(2, "Notes", FieldType::Textarea),
            field(3, "Tags", FieldType::Text),
            field(4, "Missing", FieldType::Text),
        ];
        let extracted = parse_response(
            &chat(r#"{"Agree":true,"Guests":3,"Notes":null,"Tags":["a","b"]}"#),
            &fields,
        )
        .unwrap();
        assert_eq!(extracted.get(0), Some(&FieldValue::Bool(true)));
        assert_eq!(extracted.get(1).unwrap().to_string(), "3");
        assert_eq!(extracted.get(2), Some(&FieldValue::Null));
        assert_eq!(
            extracted.get(3),
            Some(&FieldValue::String(r#"["a","b"]"#.into()))
        );
        assert_eq!(extracted.get(4), None);
    }

    #[test]
    fn empty_choices_is_parse_error() {
        let reply = CompletionResponse::Chat(json!({ "choices": [] }));
        let err = parse_response(&reply, &[]).unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m == "invalid or empty response"));
    }

    #[test]
    fn empty_content_is_parse_error() {
        let err = parse_response(&chat("   "), &[]).unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m == "invalid or empty response"));
    }

    #[test]
    fn assistant_without_content_is_parse_error() {
        let reply = CompletionResponse::Assistant(json!({ "role": "assistant", "content": [] }));
        assert!(matches!(
            parse_response(&reply, &[]).unwrap_err(),
            Error::Parse(_)
        ));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let fields = vec![field(0, "Name", FieldType::Text)];
        let err = parse_response(&chat("Name: Alice"), &fields).unwrap_err();
        match err {
            Error::Parse(msg) => assert!(msg.starts_with("failed to parse response:"), "{}", msg),
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn non_object_json_is_parse_error() {
        let err = parse_response(&chat(r#"["Alice"]"#), &[]).unwrap_err();
        match err {
            Error::Parse(msg) => assert!(msg.contains("an array"), "{}", msg),
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }
}
