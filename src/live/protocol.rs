//! `{type, data}` JSON messages exchanged over the live channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::line::LogLine;

/// Client to server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    SetInstances(Vec<String>),
    /// Incremental forms the server also accepts. The channel never sends
    /// them: every subscription change goes out as a full `SetInstances`,
    /// which survives the server losing its copy of the set.
    AddSubscriptionInstance(String),
    RemoveSubscriptionInstance(String),
    Ping,
    Pong,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server to client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    NewLine(LogLine),
    Ping,
    Pong,
    /// A well-formed message of a type this client does not handle.
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<ServerMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.kind.as_str() {
        "newLine" => {
            let data = envelope
                .data
                .ok_or_else(|| ProtocolError::MissingData(envelope.kind.clone()))?;
            let line = match data {
                // Some servers double-encode the payload.
                Value::String(inner) => serde_json::from_str(&inner)?,
                other => serde_json::from_value(other)?,
            };
            Ok(ServerMessage::NewLine(line))
        }
        "ping" => Ok(ServerMessage::Ping),
        "pong" => Ok(ServerMessage::Pong),
        _ => Ok(ServerMessage::Other(envelope.kind.clone())),
    }
}
