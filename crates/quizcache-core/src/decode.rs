//! Schema-tolerant decoding of quiz payloads.
//!
//! Remote sources have used several shapes over time:
//!
//! - a bare JSON array of quizzes, or an object wrapping the array under
//!   `quizzes` or `topics`
//! - `description` or the older `desc`
//! - the correct answer as a string-encoded `answer`, a bare integer, or a
//!   numeric `correctAnswerIndex`
//!
//! Decoding walks a `serde_json::Value` rather than deriving `Deserialize`
//! so every failure carries the field name and a JSON-path-like location.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{Question, Quiz, QuizCollection, DEFAULT_ICON};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing key '{field}' at {location}")]
    MissingField { field: String, location: String },

    #[error("Type mismatch at {location}: expected {expected}")]
    TypeMismatch { expected: String, location: String },

    #[error("Data corrupted: {0}")]
    MalformedPayload(String),
}

impl DecodeError {
    fn missing(field: &str, location: &str) -> Self {
        DecodeError::MissingField {
            field: field.to_string(),
            location: location.to_string(),
        }
    }

    fn mismatch(expected: &str, location: &str) -> Self {
        DecodeError::TypeMismatch {
            expected: expected.to_string(),
            location: location.to_string(),
        }
    }
}

/// Ways a payload may carry its quiz array, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    BareArray,
    Wrapper,
}

const PAYLOAD_SHAPES: [PayloadShape; 2] = [PayloadShape::BareArray, PayloadShape::Wrapper];

/// Keys a wrapper object may use for its quiz array, in priority order.
const WRAPPER_KEYS: [&str; 2] = ["quizzes", "topics"];

impl PayloadShape {
    /// Locate the quiz array for this shape.
    ///
    /// `None` means the payload is not this shape at all and the next shape
    /// should be tried. `Some(Err)` means it is this shape but broken.
    fn extract<'a>(self, root: &'a Value) -> Option<Result<(&'a [Value], String), DecodeError>> {
        match self {
            PayloadShape::BareArray => root
                .as_array()
                .map(|items| Ok((items.as_slice(), "$".to_string()))),
            PayloadShape::Wrapper => {
                let object = root.as_object()?;
                // A null key counts as absent
                let found = WRAPPER_KEYS.iter().find_map(|key| {
                    object
                        .get(*key)
                        .filter(|value| !value.is_null())
                        .map(|value| (*key, value))
                });
                Some(match found {
                    Some((key, Value::Array(items))) => Ok((items.as_slice(), format!("$.{}", key))),
                    Some((key, _)) => Err(DecodeError::mismatch("array", &format!("$.{}", key))),
                    None => Err(DecodeError::MalformedPayload(
                        "No quizzes found in response".to_string(),
                    )),
                })
            }
        }
    }
}

/// Decode a raw payload into a quiz collection.
pub fn decode(bytes: &[u8]) -> Result<QuizCollection, DecodeError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    for shape in PAYLOAD_SHAPES {
        if let Some(extracted) = shape.extract(&root) {
            let (items, location) = extracted?;
            debug!(shape = ?shape, count = items.len(), "Decoding quiz payload");
            return items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_quiz(item, &format!("{}[{}]", location, i)))
                .collect();
        }
    }

    Err(DecodeError::mismatch("array or object", "$"))
}

fn decode_quiz(value: &Value, location: &str) -> Result<Quiz, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::mismatch("object", location))?;

    let title = match object.get("title") {
        None | Some(Value::Null) => return Err(DecodeError::missing("title", location)),
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(_) => {
            return Err(DecodeError::mismatch(
                "non-empty string",
                &format!("{}.title", location),
            ))
        }
    };

    let description = optional_string(object, "description")
        .or_else(|| optional_string(object, "desc"))
        .unwrap_or_default();
    let icon = optional_string(object, "icon")
        .filter(|icon| !icon.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ICON.to_string());

    let questions = match object.get("questions") {
        None | Some(Value::Null) => return Err(DecodeError::missing("questions", location)),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_question(item, &format!("{}.questions[{}]", location, i)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(DecodeError::mismatch(
                "array",
                &format!("{}.questions", location),
            ))
        }
    };

    Ok(Quiz::new(title, description, icon, questions))
}

fn decode_question(value: &Value, location: &str) -> Result<Question, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::mismatch("object", location))?;

    let text = match object.get("text") {
        None | Some(Value::Null) => return Err(DecodeError::missing("text", location)),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(DecodeError::mismatch("string", &format!("{}.text", location))),
    };

    let answers_location = format!("{}.answers", location);
    let answers = match object.get("answers") {
        None | Some(Value::Null) => return Err(DecodeError::missing("answers", location)),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    DecodeError::mismatch("string", &format!("{}[{}]", answers_location, i))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(DecodeError::mismatch(
                "non-empty array of strings",
                &answers_location,
            ))
        }
    };

    let correct = resolve_correct_index(object, answers.len());
    Ok(Question::new(text, answers, correct))
}

/// Resolve the correct answer index: `answer`, then `correctAnswerIndex`,
/// then 0. Candidates that do not parse or fall outside the answer list are
/// skipped, so the result is always a valid index.
fn resolve_correct_index(object: &Map<String, Value>, answer_count: usize) -> usize {
    ["answer", "correctAnswerIndex"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(as_index))
        .find(|index| *index < answer_count)
        .unwrap_or(0)
}

fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => s.trim().parse::<usize>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        _ => None,
    }
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}
