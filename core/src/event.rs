//! Change stream events.

use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Where a batch of changes entered this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// Written by a caller on this device
    Local,
    /// Merged in from the remote log
    Server,
}

/// One broadcast on the change stream.
///
/// Events always carry a non-empty message list. Subscribers that join
/// late receive only events emitted after they subscribed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub source: ChangeSource,
    pub messages: Vec<Message>,
}

impl ChangeEvent {
    /// Event for locally written messages.
    pub fn local(messages: Vec<Message>) -> Self {
        Self {
            source: ChangeSource::Local,
            messages,
        }
    }

    /// Event for messages merged from the remote log.
    pub fn server(messages: Vec<Message>) -> Self {
        Self {
            source: ChangeSource::Server,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Hlc;
    use crate::value::Value;

    #[test]
    fn constructors_set_source() {
        let message = Message::new(
            "m1",
            "t",
            "r",
            "c",
            &Value::Null,
            &Hlc::new(1, 0, "n"),
            "u",
            "n",
        );
        assert_eq!(
            ChangeEvent::local(vec![message.clone()]).source,
            ChangeSource::Local
        );
        assert_eq!(ChangeEvent::server(vec![message]).source, ChangeSource::Server);
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChangeSource::Local).unwrap(),
            "\"local\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeSource::Server).unwrap(),
            "\"server\""
        );
    }
}
