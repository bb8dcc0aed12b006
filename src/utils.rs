use crate::client::ClientError;
use log::{Level, debug, log_enabled};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

const EXCERPT_CHARS: usize = 200;

/// First 200 characters of a response body, newlines collapsed to spaces.
pub fn excerpt(text: &str) -> String {
    text.chars()
        .take(EXCERPT_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Pretty-printed JSON, cut after `limit` characters when one is given.
pub fn payload_dump<S: Serialize + ?Sized>(payload: &S, limit: Option<usize>) -> String {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|e| format!("<unserializable: {}>", e));
    match limit {
        Some(limit) if text.chars().count() > limit => {
            let mut cut: String = text.chars().take(limit).collect();
            cut.push_str("...");
            cut
        }
        _ => text,
    }
}

/// Logs a raw payload at debug level; nothing is serialized unless debug is on.
pub fn debug_payload<S: Serialize + ?Sized>(label: &str, payload: &S, limit: Option<usize>) {
    if log_enabled!(Level::Debug) {
        debug!("{}:\n{}", label, payload_dump(payload, limit));
    }
}

/// Decode a response body into a typed model, reporting the JSON path on failure.
pub fn decode_json<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, ClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de)
        .map_err(|e| ClientError::MalformedResponse(format!("{} at `{}`: {}", what, e.path(), e.inner())))
}

/// Same as [`decode_json`] for a body that was already parsed.
pub fn decode_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ClientError> {
    serde_path_to_error::deserialize(value)
        .map_err(|e| ClientError::MalformedResponse(format!("{} at `{}`: {}", what, e.path(), e.inner())))
}
