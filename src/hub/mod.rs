//! The Hub - single authority over connection lifecycle and fan-out.
//!
//! All directory mutation goes through one coordination task fed by an
//! mpsc control channel, so the membership maps never see concurrent
//! writers. Handles are cheap clones of the control-channel sender; the
//! hub itself is constructed in main and explicitly spawned.

mod directory;

pub use directory::{ConnId, Directory, Payload};

use crate::proto::{ChannelId, UserId};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Control channel depth. Bounded so a flood of hub operations applies
/// backpressure to callers instead of growing without limit.
const CONTROL_QUEUE: usize = 1024;

/// A connection registering with the hub.
pub struct Registration {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub queue: mpsc::Sender<Payload>,
}

enum Command {
    Register(Registration),
    Unregister { conn_id: ConnId },
    Subscribe { channel_id: ChannelId, conn_id: ConnId },
    BroadcastToUser { user_id: UserId, payload: Payload },
    BroadcastToChannel { channel_id: ChannelId, payload: Payload },
    Shutdown,
}

/// The hub coordination task. Owns the directory; runs until shutdown.
pub struct Hub {
    rx: mpsc::Receiver<Command>,
    directory: Directory,
}

/// Cloneable handle for submitting hub operations.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl Hub {
    /// Create a hub and its handle. The hub must then be spawned via
    /// [`Hub::run`].
    pub fn new() -> (HubHandle, Hub) {
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE);
        (
            HubHandle { tx },
            Hub {
                rx,
                directory: Directory::default(),
            },
        )
    }

    /// Process hub operations serially, in arrival order.
    pub async fn run(mut self) {
        info!("Hub coordination loop started");
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::Register(reg) => {
                    debug!(conn_id = reg.conn_id, user_id = reg.user_id, "Register");
                    self.directory.register(reg.conn_id, reg.user_id, reg.queue);
                    crate::metrics::set_connected_clients(self.directory.len() as i64);
                }
                Command::Unregister { conn_id } => {
                    debug!(conn_id, "Unregister");
                    self.directory.unregister(conn_id);
                    crate::metrics::set_connected_clients(self.directory.len() as i64);
                }
                Command::Subscribe { channel_id, conn_id } => {
                    self.directory.subscribe(channel_id, conn_id);
                }
                Command::BroadcastToUser { user_id, payload } => {
                    let reached = self.directory.broadcast_to_user(user_id, &payload);
                    crate::metrics::record_fanout(reached);
                }
                Command::BroadcastToChannel { channel_id, payload } => {
                    let reached = self.directory.broadcast_to_channel(channel_id, &payload);
                    crate::metrics::record_fanout(reached);
                }
                Command::Shutdown => {
                    info!(connections = self.directory.len(), "Hub shutting down");
                    self.directory.clear();
                    break;
                }
            }
        }
        info!("Hub coordination loop stopped");
    }
}

impl HubHandle {
    /// Register a connection under its user identity.
    pub async fn register(&self, registration: Registration) {
        self.send(Command::Register(registration)).await;
    }

    /// Remove a connection everywhere. Safe to call for connections that
    /// never finished registering.
    pub async fn unregister(&self, conn_id: ConnId) {
        self.send(Command::Unregister { conn_id }).await;
    }

    /// Subscribe a connection to a channel's live broadcasts.
    pub async fn subscribe(&self, channel_id: ChannelId, conn_id: ConnId) {
        self.send(Command::Subscribe { channel_id, conn_id }).await;
    }

    /// Enqueue a payload to every connection of a user. Offline users
    /// silently receive nothing; the notification path covers them.
    pub async fn broadcast_to_user(&self, user_id: UserId, payload: Payload) {
        self.send(Command::BroadcastToUser { user_id, payload }).await;
    }

    /// Enqueue a payload to every subscriber of a channel, sender included.
    pub async fn broadcast_to_channel(&self, channel_id: ChannelId, payload: Payload) {
        self.send(Command::BroadcastToChannel { channel_id, payload })
            .await;
    }

    /// Stop the coordination loop, draining and closing all connections.
    pub async fn shutdown(&self) {
        self.send(Command::Shutdown).await;
    }

    async fn send(&self, cmd: Command) {
        // A send failure means the hub is already gone; callers are on
        // their way down too, so the operation is dropped.
        if self.tx.send(cmd).await.is_err() {
            debug!("Hub control channel closed, operation dropped");
        }
    }
}
