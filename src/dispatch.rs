//! Inbound message classification and fan-out
//!
//! Pure functions implementing the inverse of the namespace derivation:
//! strip the configured prefix, take the first remaining segment as the
//! topic type token, and match its first four characters against the
//! inbound category tokens. Payload decoding and batch fan-out live here
//! too so the supervisor only does wiring.

use serde_json::Value;

use crate::topics::TopicCategory;

/// Message class derived from an inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Config,
    Command,
    /// Anything that is not a config or command topic. Discarded with a
    /// diagnostic; in particular the outbound-only status/telemetry/lwt/adopt
    /// topics always land here.
    Unknown,
}

/// Classify an inbound topic against the configured prefix.
pub fn classify(topic: &str, prefix: Option<&str>) -> MessageClass {
    let rest = match prefix {
        Some(p) if !p.is_empty() => topic.strip_prefix(p).unwrap_or(topic),
        _ => topic,
    };
    let token = rest
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();

    if token_matches(token, TopicCategory::Config.token()) {
        MessageClass::Config
    } else if token_matches(token, TopicCategory::Command.token()) {
        MessageClass::Command
    } else {
        MessageClass::Unknown
    }
}

/// Four-character prefix comparison, mirroring the wire contract: any
/// segment starting with the category token matches.
fn token_matches(token: &str, category: &str) -> bool {
    token.as_bytes().get(..4) == Some(category.as_bytes())
}

/// Decode a raw payload through the JSON codec.
pub fn decode(payload: &[u8]) -> Result<Value, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Expand a decoded payload into the sequence of objects to dispatch.
/// An array root fans out one element per handler invocation, in array
/// order; any other root dispatches exactly once.
pub fn batch_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}
