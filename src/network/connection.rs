//! Connection - one WebSocket session for one authenticated user.
//!
//! Each connection runs two pumps: a read pump that feeds inbound frames
//! to the router, and a write pump that drains the bounded outbound queue
//! into the socket. Registration with the hub happens before either pump
//! starts; unregistration is unconditional when the read pump exits.

use crate::db::Database;
use crate::hub::{ConnId, HubHandle, Payload, Registration};
use crate::proto::{Frame, UserId};
use crate::router::Router;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Outbound queue depth per connection. When full, further frames for
/// this connection are dropped rather than stalling the hub.
const OUTBOUND_QUEUE: usize = 256;

/// A live client session.
pub struct Connection {
    conn_id: ConnId,
    user_id: UserId,
    addr: SocketAddr,
    stream: WebSocketStream<TcpStream>,
    hub: HubHandle,
    router: Arc<Router>,
    db: Database,
}

impl Connection {
    pub fn new(
        conn_id: ConnId,
        user_id: UserId,
        addr: SocketAddr,
        stream: WebSocketStream<TcpStream>,
        hub: HubHandle,
        router: Arc<Router>,
        db: Database,
    ) -> Self {
        Self {
            conn_id,
            user_id,
            addr,
            stream,
            hub,
            router,
            db,
        }
    }

    /// Drive the session until the client disconnects or the socket fails.
    pub async fn run(self) {
        let Connection {
            conn_id,
            user_id,
            addr,
            stream,
            hub,
            router,
            db,
        } = self;

        let (mut sink, mut source) = stream.split();
        let (queue_tx, mut queue_rx) = mpsc::channel::<Payload>(OUTBOUND_QUEUE);

        // Register before pumping so no broadcast can slip past us.
        hub.register(Registration {
            conn_id,
            user_id,
            queue: queue_tx.clone(),
        })
        .await;
        info!(conn_id, user_id, %addr, "Connection registered");

        // Write pump: drains the outbound queue into the socket. Ends when
        // the hub drops the last queue sender or the socket write fails.
        let writer = tokio::spawn(async move {
            while let Some(payload) = queue_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                    debug!(conn_id, error = %e, "Write failed, closing write pump");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Subscription preload runs detached so a slow store never delays
        // the read pump. The confirmation frame goes out when it finishes.
        {
            let hub = hub.clone();
            let queue = queue_tx.clone();
            tokio::spawn(async move {
                let channel_ids = match db.channels().channel_ids_for_user(user_id).await {
                    Ok(channel_ids) => channel_ids,
                    Err(e) => {
                        // No confirmation without a completed preload; the
                        // client can tell the session never fully opened.
                        warn!(conn_id, user_id, error = %e, "Channel preload failed");
                        return;
                    }
                };
                for channel_id in channel_ids {
                    hub.subscribe(channel_id, conn_id).await;
                }
                let confirm: Payload = Arc::from(Frame::ConnectionEstablished.to_json().as_str());
                let _ = queue.try_send(confirm);
            });
        }

        // Read pump.
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    router.handle_frame(user_id, &queue_tx, &text).await;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {
                    // Pings are answered by tungstenite; binary is ignored.
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(conn_id, error = %e, "Read failed, closing connection");
                    break;
                }
            }
        }

        hub.unregister(conn_id).await;
        drop(queue_tx);
        let _ = writer.await;
        info!(conn_id, user_id, %addr, "Connection closed");
    }
}
