//! Temporary agent memory: a message list persisted per agent id.
//!
//! Messages are wrapped in a versioned envelope, serialised to JSON and
//! base64-encoded, then written to a [`ConfigStore`] under
//! `temp_memory_{agent_id}`:
//!
//! ```text
//! {"version":1,"messages":[{"role":"user","content":"hi"}, ...]}
//! ```
//!
//! One writer per agent id. The store's lock makes each `save` and `get`
//! atomic, but a caller that reads, modifies and saves the same id from two
//! threads will lose updates.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::storage::ConfigStore;

/// Envelope version written by [`encode`].
pub const ENVELOPE_VERSION: u32 = 1;

const KEY_PREFIX: &str = "temp_memory_";

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    /// Plain text or any structured payload (content parts, tool calls).
    pub content: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    messages: Vec<Message>,
}

/// Encode `messages` into the stored blob format.
pub fn encode(messages: &[Message]) -> Result<String, AppError> {
    #[derive(Serialize)]
    struct EnvelopeRef<'a> {
        version: u32,
        messages: &'a [Message],
    }

    let json = serde_json::to_vec(&EnvelopeRef { version: ENVELOPE_VERSION, messages })
        .map_err(|e| AppError::Memory(format!("serialise messages: {e}")))?;
    Ok(STANDARD.encode(json))
}

/// Decode a blob produced by [`encode`].
pub fn decode(blob: &str) -> Result<Vec<Message>, AppError> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|e| AppError::Memory(format!("invalid base64 in memory blob: {e}")))?;
    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Memory(format!("malformed memory envelope: {e}")))?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(AppError::Memory(format!(
            "unsupported envelope version {} (expected {ENVELOPE_VERSION})",
            envelope.version
        )));
    }
    Ok(envelope.messages)
}

/// Store key for `agent_id`.
pub fn memory_key(agent_id: &str) -> String {
    format!("{KEY_PREFIX}{agent_id}")
}

/// Per-agent message cache over a [`ConfigStore`].
#[derive(Debug, Clone, Copy)]
pub struct TemporaryMemory<'a> {
    store: &'a ConfigStore,
}

impl<'a> TemporaryMemory<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    /// Replace the stored messages for `agent_id`.
    pub fn save(&self, agent_id: &str, messages: &[Message]) -> Result<(), AppError> {
        let blob = encode(messages)?;
        self.store.set(&memory_key(agent_id), &blob)?;
        debug!(agent_id, count = messages.len(), bytes = blob.len(), "temporary memory saved");
        Ok(())
    }

    /// Stored messages for `agent_id`, or `None` if nothing was saved.
    pub fn get(&self, agent_id: &str) -> Result<Option<Vec<Message>>, AppError> {
        match self.store.get_str(&memory_key(agent_id))? {
            Some(blob) => decode(&blob).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path(), "config.db").unwrap();
        (dir, store)
    }

    fn sample() -> Vec<Message> {
        vec![
            Message::new("system", "You are terse."),
            Message::new("user", "list the files").with_metadata("turn", 1),
            Message::new(
                "assistant",
                json!([{"type": "tool_call", "name": "ls", "args": {"path": "/", "all": false}}]),
            )
            .with_metadata("usage", json!({"prompt_tokens": 12, "completion_tokens": 3})),
        ]
    }

    #[test]
    fn save_then_get_returns_same_messages() {
        let (_dir, store) = setup();
        let memory = TemporaryMemory::new(&store);
        let messages = sample();

        memory.save("agent-1", &messages).unwrap();
        assert_eq!(memory.get("agent-1").unwrap(), Some(messages));
    }

    #[test]
    fn unknown_agent_is_none() {
        let (_dir, store) = setup();
        let memory = TemporaryMemory::new(&store);
        assert_eq!(memory.get("unknown-agent").unwrap(), None);
    }

    #[test]
    fn empty_list_is_present() {
        let (_dir, store) = setup();
        let memory = TemporaryMemory::new(&store);
        memory.save("agent-1", &[]).unwrap();
        assert_eq!(memory.get("agent-1").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn last_save_wins_and_agents_are_isolated() {
        let (_dir, store) = setup();
        let memory = TemporaryMemory::new(&store);
        memory.save("a", &sample()).unwrap();
        memory.save("b", &[Message::new("user", "other")]).unwrap();
        memory.save("a", &[Message::new("user", "replaced")]).unwrap();

        assert_eq!(memory.get("a").unwrap(), Some(vec![Message::new("user", "replaced")]));
        assert_eq!(memory.get("b").unwrap(), Some(vec![Message::new("user", "other")]));
    }

    #[test]
    fn stored_under_prefixed_key() {
        let (_dir, store) = setup();
        TemporaryMemory::new(&store).save("agent-7", &sample()).unwrap();
        assert!(store.contains("temp_memory_agent-7").unwrap());
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let blob = STANDARD.encode(br#"{"version":99,"messages":[]}"#);
        let err = decode(&blob).unwrap_err();
        assert!(err.to_string().contains("unsupported envelope version 99"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not base64!!").is_err());
        assert!(decode(&STANDARD.encode(b"[1,2,3]")).is_err());
    }

    #[test]
    fn metadata_is_omitted_when_empty() {
        let blob = encode(&[Message::new("user", "hi")]).unwrap();
        let json = String::from_utf8(STANDARD.decode(blob).unwrap()).unwrap();
        assert_eq!(json, r#"{"version":1,"messages":[{"role":"user","content":"hi"}]}"#);
    }
}
