//! Membership directory: who is connected, and on which channels.
//!
//! Plain maps, mutated only from the Hub's coordination task. The single
//! writer is the concurrency contract; nothing here is shared or locked.

use crate::proto::{ChannelId, UserId};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Connection identity: one live transport session for one user.
pub type ConnId = u64;

/// A frame payload ready for the wire, shared across recipients.
pub type Payload = std::sync::Arc<str>;

struct ConnEntry {
    user_id: UserId,
    queue: mpsc::Sender<Payload>,
    channels: HashSet<ChannelId>,
}

/// In-memory mapping from users and channels to live connections.
///
/// A derived, best-effort cache of "who is currently connected"; the
/// persisted store remains the system of record for membership.
#[derive(Default)]
pub struct Directory {
    conns: HashMap<ConnId, ConnEntry>,
    users: HashMap<UserId, HashSet<ConnId>>,
    channels: HashMap<ChannelId, HashSet<ConnId>>,
}

impl Directory {
    /// Add a connection under its user. Idempotent per connection id;
    /// channel subscriptions are added separately once known.
    pub fn register(&mut self, conn_id: ConnId, user_id: UserId, queue: mpsc::Sender<Payload>) {
        if self.conns.contains_key(&conn_id) {
            return;
        }
        self.conns.insert(
            conn_id,
            ConnEntry {
                user_id,
                queue,
                channels: HashSet::new(),
            },
        );
        self.users.entry(user_id).or_default().insert(conn_id);
    }

    /// Remove a connection from its user's set and from every channel
    /// subscriber set. Best-effort: missing entries are not an error.
    /// Dropping the queue sender here closes the outbound queue once the
    /// connection's own handles are gone.
    pub fn unregister(&mut self, conn_id: ConnId) {
        let Some(entry) = self.conns.remove(&conn_id) else {
            return;
        };

        if let Some(set) = self.users.get_mut(&entry.user_id) {
            set.remove(&conn_id);
            if set.is_empty() {
                self.users.remove(&entry.user_id);
            }
        }

        for channel_id in &entry.channels {
            if let Some(set) = self.channels.get_mut(channel_id) {
                set.remove(&conn_id);
                if set.is_empty() {
                    self.channels.remove(channel_id);
                }
            }
        }
    }

    /// Subscribe a connection to a channel. Ignored if the connection has
    /// already unregistered, so a late preload cannot orphan an entry.
    pub fn subscribe(&mut self, channel_id: ChannelId, conn_id: ConnId) {
        let Some(entry) = self.conns.get_mut(&conn_id) else {
            debug!(conn_id, channel_id, "Subscribe for unknown connection ignored");
            return;
        };
        entry.channels.insert(channel_id);
        self.channels.entry(channel_id).or_default().insert(conn_id);
    }

    /// Enqueue a payload to every connection of a user. Returns the number
    /// of queues the payload reached.
    pub fn broadcast_to_user(&self, user_id: UserId, payload: &Payload) -> usize {
        let Some(conn_ids) = self.users.get(&user_id) else {
            return 0;
        };
        self.offer_all(conn_ids, payload)
    }

    /// Enqueue a payload to every subscriber of a channel, sender included.
    /// Returns the number of queues the payload reached.
    pub fn broadcast_to_channel(&self, channel_id: ChannelId, payload: &Payload) -> usize {
        let Some(conn_ids) = self.channels.get(&channel_id) else {
            return 0;
        };
        self.offer_all(conn_ids, payload)
    }

    fn offer_all(&self, conn_ids: &HashSet<ConnId>, payload: &Payload) -> usize {
        let mut reached = 0;
        for conn_id in conn_ids {
            let Some(entry) = self.conns.get(conn_id) else {
                continue;
            };
            // try_send keeps a slow or dead consumer from stalling fan-out
            // to the rest of the recipients.
            match entry.queue.try_send(payload.clone()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn_id, user_id = entry.user_id, "Outbound queue full, dropping frame");
                    crate::metrics::record_dropped_frame();
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(conn_id, "Outbound queue closed, dropping frame");
                }
            }
        }
        reached
    }

    /// Drop every connection entry, closing all outbound queues.
    pub fn clear(&mut self) {
        self.conns.clear();
        self.users.clear();
        self.channels.clear();
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// True when no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
