//! The message record: one cell mutation.

use crate::clock::Hlc;
use crate::value::Value;
use crate::{MessageId, ServerTimestamp};
use serde::{Deserialize, Serialize};

/// An immutable record of one cell mutation.
///
/// The cell is addressed by `(table, row, column)`; all three are opaque
/// identifiers with no charset constraints (empty strings are legal).
/// Messages are append-only once logged: only the bookkeeping flags and
/// the server timestamp may change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Globally unique message identifier
    pub id: MessageId,
    /// Target table
    pub table: String,
    /// Target row
    pub row: String,
    /// Target column
    pub column: String,
    /// Wire tag of the payload, see [`crate::value::tag`]
    pub data_type: String,
    /// Serialized payload
    pub value: String,
    /// Packed HLC of the writer at write time
    pub local_timestamp: String,
    /// Position in the remote log; absent until accepted remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<ServerTimestamp>,
    /// Originating principal
    pub user_id: String,
    /// Originating device
    pub client_id: String,
    /// Whether the value was ever merged into the local cell view
    #[serde(default)]
    pub has_been_applied: bool,
    /// Whether the remote log has durably accepted the message
    #[serde(default)]
    pub has_been_synced: bool,
}

impl Message {
    /// Create a fresh, unsynced local message.
    pub fn new(
        id: impl Into<MessageId>,
        table: impl Into<String>,
        row: impl Into<String>,
        column: impl Into<String>,
        value: &Value,
        timestamp: &Hlc,
        user_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let (data_type, value) = value.encode();
        Self {
            id: id.into(),
            table: table.into(),
            row: row.into(),
            column: column.into(),
            data_type,
            value,
            local_timestamp: timestamp.pack(),
            server_timestamp: None,
            user_id: user_id.into(),
            client_id: client_id.into(),
            has_been_applied: false,
            has_been_synced: false,
        }
    }

    /// The cell this message targets.
    pub fn cell(&self) -> (&str, &str, &str) {
        (&self.table, &self.row, &self.column)
    }

    /// Typed view of the payload.
    pub fn decoded_value(&self) -> Value {
        Value::decode(&self.data_type, &self.value)
    }

    /// Parsed writer timestamp, if well-formed.
    pub fn timestamp(&self) -> Option<Hlc> {
        Hlc::parse(&self.local_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> Message {
        Message::new(
            "msg-1",
            "todos",
            "todo-1",
            "title",
            &Value::from("Buy milk"),
            &Hlc::new(1_704_067_200_000, 0, "client-1"),
            "user-1",
            "client-1",
        )
    }

    #[test]
    fn new_message_is_unapplied_and_unsynced() {
        let message = test_message();
        assert!(!message.has_been_applied);
        assert!(!message.has_been_synced);
        assert_eq!(message.server_timestamp, None);
        assert_eq!(message.data_type, "string");
        assert_eq!(message.value, "Buy milk");
    }

    #[test]
    fn cell_accessor() {
        let message = test_message();
        assert_eq!(message.cell(), ("todos", "todo-1", "title"));
    }

    #[test]
    fn decoded_value_roundtrip() {
        let message = test_message();
        assert_eq!(message.decoded_value(), Value::from("Buy milk"));
    }

    #[test]
    fn timestamp_parses_packed_form() {
        let message = test_message();
        assert_eq!(
            message.timestamp(),
            Some(Hlc::new(1_704_067_200_000, 0, "client-1"))
        );

        let mut malformed = test_message();
        malformed.local_timestamp = "not a clock".into();
        assert_eq!(malformed.timestamp(), None);
    }

    #[test]
    fn serialization_uses_camel_case() {
        let message = test_message();
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("localTimestamp"));
        assert!(json.contains("dataType"));
        assert!(json.contains("hasBeenSynced"));
        // absent server timestamp is omitted entirely
        assert!(!json.contains("serverTimestamp"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, parsed);
    }

    #[test]
    fn serialization_with_server_timestamp() {
        let mut message = test_message();
        message.server_timestamp = Some(17);
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"serverTimestamp\":17"));

        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server_timestamp, Some(17));
    }

    #[test]
    fn empty_identifiers_are_preserved() {
        let message = Message::new(
            "msg-2",
            "",
            "",
            "",
            &Value::Null,
            &Hlc::new(0, 0, ""),
            "",
            "",
        );
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, parsed);
        assert_eq!(parsed.cell(), ("", "", ""));
    }
}
