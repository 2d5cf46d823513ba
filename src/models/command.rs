//! Commands queued for devices.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Well-known command names.
pub mod names {
    pub const FEED: &str = "feed";
    /// Payload-less hint: re-pull schedules/settings on next convenient poll.
    pub const SYNC: &str = "sync";
    pub const RESTART: &str = "restart";
    pub const UNLINK: &str = "unlink";
}

/// A small instruction for a device, delivered on its next poll.
///
/// Serializes flat, as `{"command": name, ...payload}`. A `command` key inside
/// the payload never overrides the name.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn sync() -> Self {
        Self::new(names::SYNC)
    }

    pub fn is_sync(&self) -> bool {
        self.name == names::SYNC
    }

    /// The flat JSON object a polling device receives.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut wire = self.payload.clone();
        wire.insert("command".to_string(), Value::String(self.name.clone()));
        wire
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// A command sitting in a device's queue.
#[derive(Debug, Clone)]
pub struct CommandQueueEntry {
    pub device_id: String,
    pub command: Command,
    pub enqueued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_serializes_flat() {
        let mut payload = Map::new();
        payload.insert("size".to_string(), json!("medium"));
        let cmd = Command::with_payload(names::FEED, payload);

        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value, json!({"command": "feed", "size": "medium"}));
    }

    #[test]
    fn test_payload_cannot_override_name() {
        let mut payload = Map::new();
        payload.insert("command".to_string(), json!("restart"));
        let cmd = Command::with_payload(names::FEED, payload);

        assert_eq!(cmd.to_wire()["command"], "feed");
    }

    #[test]
    fn test_sync_has_no_payload() {
        let value = serde_json::to_value(Command::sync()).unwrap();
        assert_eq!(value, json!({"command": "sync"}));
    }
}
