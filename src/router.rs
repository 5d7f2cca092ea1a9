//! Message validation and routing.
//!
//! One inbound text frame flows through decode, validation, persistence,
//! hub fan-out, then detached notification dispatch - in that order.
//! Nothing is persisted or broadcast for a frame that fails validation.

use crate::db::Database;
use crate::error::{RouteError, ValidationError};
use crate::hub::{HubHandle, Payload};
use crate::notify::{CHANNEL_PREVIEW_LEN, Dispatcher, PEER_PREVIEW_LEN, PushNote, preview};
use crate::proto::{ChannelMessageIn, Envelope, Frame, FrameKind, PeerMessageIn, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routes validated messages to the hub and the notification dispatcher.
pub struct Router {
    db: Database,
    hub: HubHandle,
    notifier: Arc<Dispatcher>,
}

impl Router {
    pub fn new(db: Database, hub: HubHandle, notifier: Arc<Dispatcher>) -> Self {
        Self { db, hub, notifier }
    }

    /// Process one raw text frame from a connection's read pump.
    ///
    /// Validation and persistence errors are reported back on `reply`,
    /// the sending connection's own outbound queue. Frames that are not
    /// JSON at all are logged and dropped without a reply.
    pub async fn handle_frame(&self, sender_id: UserId, reply: &mpsc::Sender<Payload>, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(e) => {
                debug!(sender_id, error = %e, "Discarding undecodable frame");
                crate::metrics::record_validation_failure("decode");
                return;
            }
        };

        if let Err(e) = self.route(sender_id, envelope).await {
            warn!(sender_id, code = e.error_code(), error = %e, "Message rejected");
            crate::metrics::record_validation_failure(e.error_code());
            let frame: Payload = Arc::from(e.to_frame().to_json().as_str());
            if reply.try_send(frame).is_err() {
                debug!(sender_id, "Could not deliver error frame, queue unavailable");
            }
        }
    }

    async fn route(&self, sender_id: UserId, envelope: Envelope) -> Result<(), RouteError> {
        match envelope.kind {
            FrameKind::Peer => {
                let body = envelope
                    .peer_message
                    .ok_or(ValidationError::MissingPeerBody)?;
                self.route_peer(sender_id, body).await
            }
            FrameKind::Channel => {
                let body = envelope
                    .channel_message
                    .ok_or(ValidationError::MissingChannelBody)?;
                self.route_channel(sender_id, body).await
            }
            FrameKind::Unknown => Err(ValidationError::UnknownType.into()),
        }
    }

    async fn route_peer(&self, sender_id: UserId, body: PeerMessageIn) -> Result<(), RouteError> {
        if body.receiver_id <= 0 {
            return Err(ValidationError::InvalidReceiver.into());
        }
        if body.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let created_at = chrono::Utc::now().timestamp();
        let record = self
            .db
            .messages()
            .insert_peer(sender_id, body.receiver_id, &body.content, created_at)
            .await?;

        let receiver_id = record.receiver_id;
        let note_body = preview(&record.content, PEER_PREVIEW_LEN);
        let note_data = serde_json::json!({
            "messageType": "peer",
            "messageId": record.id,
            "senderId": record.sender_id,
            "timestamp": record.created_at,
        });
        let frame = Frame::Peer {
            peer_message: record,
        };
        let payload: Payload = Arc::from(frame.to_json().as_str());

        // Delivery goes to the receiver's connections only; the sender
        // gets no echo on the peer path.
        self.hub.broadcast_to_user(receiver_id, payload).await;
        crate::metrics::record_message("peer");

        self.notifier.spawn_notify(
            receiver_id,
            PushNote {
                title: format!("New message from User {sender_id}"),
                body: note_body,
                data: note_data,
            },
        );

        Ok(())
    }

    async fn route_channel(
        &self,
        sender_id: UserId,
        body: ChannelMessageIn,
    ) -> Result<(), RouteError> {
        if body.channel_id <= 0 {
            return Err(ValidationError::InvalidChannel.into());
        }
        if body.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        // Admin check comes before persistence: a rejected message leaves
        // no trace in the store.
        if !self.db.channels().is_admin(body.channel_id, sender_id).await? {
            return Err(ValidationError::NotChannelAdmin.into());
        }

        let created_at = chrono::Utc::now().timestamp();
        let record = self
            .db
            .messages()
            .insert_channel(body.channel_id, sender_id, &body.content, created_at)
            .await?;

        let note_body = preview(&record.content, CHANNEL_PREVIEW_LEN);
        let channel_id = record.channel_id;
        let message_id = record.id;
        let created_at = record.created_at;
        let frame = Frame::Channel {
            channel_message: record,
        };
        let payload: Payload = Arc::from(frame.to_json().as_str());

        self.hub.broadcast_to_channel(channel_id, payload).await;
        crate::metrics::record_message("channel");

        self.spawn_channel_notifications(channel_id, sender_id, message_id, created_at, note_body);

        Ok(())
    }

    /// Notify channel members off the routing path. Member lookup happens
    /// inside the detached task so a slow store cannot delay the sender.
    fn spawn_channel_notifications(
        &self,
        channel_id: i64,
        sender_id: UserId,
        message_id: i64,
        created_at: i64,
        body: String,
    ) {
        let db = self.db.clone();
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let channel = match db.channels().find_by_id(channel_id).await {
                Ok(Some(channel)) => channel,
                Ok(None) => return,
                Err(e) => {
                    warn!(channel_id, error = %e, "Failed to load channel for notifications");
                    return;
                }
            };
            let members = match db.channels().members(channel_id).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(channel_id, error = %e, "Failed to load members for notifications");
                    return;
                }
            };

            for member_id in members {
                // Exclusion is by user identity: no member gets a push for
                // their own message, on any of their devices.
                if member_id == sender_id {
                    continue;
                }
                notifier
                    .notify_user(
                        member_id,
                        PushNote {
                            title: format!("New message in {}", channel.name),
                            body: format!("User {sender_id}: {body}"),
                            data: serde_json::json!({
                                "messageType": "channel",
                                "messageId": message_id,
                                "channelId": channel_id,
                                "channelName": channel.name,
                                "senderId": sender_id,
                                "timestamp": created_at,
                            }),
                        },
                    )
                    .await;
            }
        });
    }
}
