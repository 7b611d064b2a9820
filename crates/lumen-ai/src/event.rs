use serde::Deserialize;
use serde_json::Value;

use crate::types::MessageId;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
/// Raw record as decoded from one `data: ` line. Every field is optional;
/// a JSON `null` is treated the same as an absent field.
pub struct WireRecord {
    pub searching: Option<Value>,
    pub thinking: Option<Value>,
    pub token: Option<Value>,
    pub done: Option<Value>,
    #[serde(rename = "final")]
    pub final_text: Option<String>,
    pub error: Option<Value>,
    pub sources: Option<Value>,
    pub image_result: Option<WireImageResult>,
    pub image_generating_background: Option<Value>,
    pub user_timestamp: Option<MessageId>,
    pub assistant_timestamp: Option<MessageId>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WireImageResult {
    pub generated_image_path: Option<String>,
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reference to an image produced by the server for the assistant reply.
pub enum GeneratedImage {
    Path(String),
    Inline(String),
}

impl WireImageResult {
    /// A path wins over inline data when the server sends both.
    fn into_generated_image(self) -> Option<GeneratedImage> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        non_empty(self.generated_image_path)
            .map(GeneratedImage::Path)
            .or_else(|| non_empty(self.image_base64).map(GeneratedImage::Inline))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Payload of the terminal `done` record.
pub struct DoneEvent {
    pub final_text: Option<String>,
    pub error: bool,
    pub error_detail: Option<String>,
    pub sources: Option<Vec<String>>,
    pub image_result: Option<GeneratedImage>,
    pub image_pending: bool,
    pub user_timestamp: Option<MessageId>,
    pub assistant_timestamp: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `StreamEvent` values.
pub enum StreamEvent {
    Searching,
    Thinking { delta: String },
    Token { text: String },
    Done(DoneEvent),
}

/// Selects the event a record carries. Fields are checked in a fixed
/// order (`searching`, `thinking`, `token`, `done`) and the first match wins,
/// so a record carrying several of them resolves deterministically. Records
/// with none of them produce no event.
pub fn classify(record: WireRecord) -> Option<StreamEvent> {
    if record.searching.as_ref().is_some_and(is_truthy) {
        return Some(StreamEvent::Searching);
    }
    if let Some(thinking) = record.thinking {
        return Some(StreamEvent::Thinking {
            delta: value_text(thinking),
        });
    }
    if let Some(token) = record.token {
        return Some(StreamEvent::Token {
            text: value_text(token),
        });
    }
    if record.done.as_ref().is_some_and(is_truthy) {
        let (error, error_detail) = match record.error {
            Some(Value::String(detail)) if !detail.is_empty() => (true, Some(detail)),
            Some(value) => (is_truthy(&value), None),
            None => (false, None),
        };
        return Some(StreamEvent::Done(DoneEvent {
            final_text: record.final_text,
            error,
            error_detail,
            sources: record.sources.map(source_list),
            image_result: record
                .image_result
                .and_then(WireImageResult::into_generated_image),
            image_pending: record
                .image_generating_background
                .as_ref()
                .is_some_and(is_truthy),
            user_timestamp: record.user_timestamp.filter(|id| !id.is_empty()),
            assistant_timestamp: record.assistant_timestamp.filter(|id| !id.is_empty()),
        }));
    }
    None
}

/// JSON truthiness as the server's clients have always read it: `false`,
/// `0`, `""` and `null` are false; everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Keeps the string entries of a `sources` array. Anything else in the
/// field is dropped rather than failing the whole record.
fn source_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(source) if !source.trim().is_empty() => Some(source),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
