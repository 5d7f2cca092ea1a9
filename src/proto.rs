//! Wire protocol for the real-time session.
//!
//! Clients exchange JSON text frames over the WebSocket. Inbound frames
//! carry a declared type plus the matching sub-message; outbound frames
//! mirror persisted message records, with two extra server-only types for
//! the connection-established confirmation and error reporting.

use serde::{Deserialize, Serialize};

/// User identity, assigned by the external identity provider.
pub type UserId = i64;

/// Channel identity, assigned by the persistence store.
pub type ChannelId = i64;

/// Declared frame type on an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Peer,
    Channel,
    /// Anything we don't recognize; rejected during validation rather
    /// than at decode time so the client gets a typed error frame.
    #[serde(other)]
    Unknown,
}

/// Inbound message envelope as sent by clients.
///
/// Both sub-messages are optional on the wire; validation enforces that
/// the one matching `kind` is present.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default)]
    pub peer_message: Option<PeerMessageIn>,
    #[serde(default)]
    pub channel_message: Option<ChannelMessageIn>,
}

/// Client-supplied peer message body.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerMessageIn {
    #[serde(default)]
    pub receiver_id: UserId,
    #[serde(default)]
    pub content: String,
}

/// Client-supplied channel message body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessageIn {
    #[serde(default)]
    pub channel_id: ChannelId,
    #[serde(default)]
    pub content: String,
}

/// A persisted peer message, as stored and as broadcast to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerMessageRecord {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// Server-assigned Unix timestamp (seconds).
    pub created_at: i64,
}

/// A persisted channel message, as stored and as broadcast to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessageRecord {
    pub id: i64,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub content: String,
    /// Server-assigned Unix timestamp (seconds).
    pub created_at: i64,
}

/// Error body carried in an `error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Outbound frame written to a client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Peer { peer_message: PeerMessageRecord },
    Channel { channel_message: ChannelMessageRecord },
    /// Sent once after the post-registration channel subscription preload
    /// has completed.
    ConnectionEstablished,
    Error { error: ErrorBody },
}

impl Frame {
    /// Serialize to the JSON text that goes on the wire.
    ///
    /// Frames are built from our own types, so serialization cannot fail.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize outbound frame");
            String::from(r#"{"type":"error","error":{"code":"internal","message":"encoding failure"}}"#)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_peer_envelope_parses() {
        let raw = r#"{"type":"peer","peer_message":{"receiver_id":7,"content":"hi"}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.kind, FrameKind::Peer);
        let body = env.peer_message.unwrap();
        assert_eq!(body.receiver_id, 7);
        assert_eq!(body.content, "hi");
        assert!(env.channel_message.is_none());
    }

    #[test]
    fn unknown_type_decodes_to_unknown() {
        let raw = r#"{"type":"presence"}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.kind, FrameKind::Unknown);
    }

    #[test]
    fn outbound_frame_shape() {
        let frame = Frame::Channel {
            channel_message: ChannelMessageRecord {
                id: 3,
                channel_id: 12,
                sender_id: 4,
                content: "update".into(),
                created_at: 1700000000,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "channel");
        assert_eq!(json["channel_message"]["channel_id"], 12);

        let confirm = Frame::ConnectionEstablished.to_json();
        assert_eq!(confirm, r#"{"type":"connection_established"}"#);
    }
}
