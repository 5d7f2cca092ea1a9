//! Gateway - TCP listener that accepts incoming WebSocket sessions.
//!
//! The gateway binds one socket, resolves the client's identity during
//! the WebSocket handshake, and spawns a Connection task per client.
//! Handshakes that fail identity resolution are rejected with an HTTP
//! error before the upgrade completes.

use crate::auth::{AuthError, Credentials, IdentityProvider};
use crate::db::Database;
use crate::hub::HubHandle;
use crate::network::Connection;
use crate::proto::UserId;
use crate::router::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, instrument, warn};

/// Time allowed for the WebSocket handshake to complete.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Header set by an upstream auth proxy carrying the verified identity.
const FORWARDED_USER_HEADER: &str = "x-authenticated-user";

/// The gateway accepts incoming connections and spawns session tasks.
pub struct Gateway {
    listener: TcpListener,
    hub: HubHandle,
    router: Arc<Router>,
    auth: Arc<dyn IdentityProvider>,
    db: Database,
    conn_ids: AtomicU64,
}

impl Gateway {
    /// Bind the gateway to the given address.
    pub async fn bind(
        addr: SocketAddr,
        hub: HubHandle,
        router: Arc<Router>,
        auth: Arc<dyn IdentityProvider>,
        db: Database,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            hub,
            router,
            auth,
            db,
            conn_ids: AtomicU64::new(1),
        })
    }

    /// The address the gateway actually bound, for ephemeral-port setups.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = self.conn_ids.fetch_add(1, Ordering::Relaxed);
                    let hub = self.hub.clone();
                    let router = Arc::clone(&self.router);
                    let auth = Arc::clone(&self.auth);
                    let db = self.db.clone();

                    tokio::spawn(async move {
                        match tokio::time::timeout(
                            HANDSHAKE_TIMEOUT,
                            handshake(stream, addr, auth),
                        )
                        .await
                        {
                            Ok(Some((ws_stream, user_id))) => {
                                Connection::new(conn_id, user_id, addr, ws_stream, hub, router, db)
                                    .run()
                                    .await;
                            }
                            Ok(None) => {}
                            Err(_) => {
                                warn!(%addr, "WebSocket handshake timed out");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Perform the WebSocket handshake, resolving the client's identity from
/// the request path (`/ws/{id}`) and the forwarded-identity header.
///
/// Returns `None` when the handshake was rejected; the rejection response
/// has already been written to the client.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    auth: Arc<dyn IdentityProvider>,
) -> Option<(tokio_tungstenite::WebSocketStream<TcpStream>, UserId)> {
    let mut authenticated: Option<UserId> = None;

    let callback = |req: &http::Request<()>, response: http::Response<()>| {
        let declared = declared_user(req.uri().path());
        let forwarded = req
            .headers()
            .get(FORWARDED_USER_HEADER)
            .and_then(|v| v.to_str().ok());

        match auth.authenticate(&Credentials {
            forwarded_user: forwarded,
            declared,
        }) {
            Ok(user_id) => {
                authenticated = Some(user_id);
                Ok(response)
            }
            Err(e) => {
                warn!(%addr, path = req.uri().path(), error = %e, "Handshake rejected");
                let status = match e {
                    AuthError::MissingCredentials => http::StatusCode::UNAUTHORIZED,
                    AuthError::Malformed(_) | AuthError::Mismatch => http::StatusCode::FORBIDDEN,
                };
                Err(http::Response::builder()
                    .status(status)
                    .body(Some(e.to_string()))
                    .unwrap_or_default())
            }
        }
    };

    match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => {
            let user_id = authenticated?;
            info!(%addr, user_id, "WebSocket handshake successful");
            Some((ws_stream, user_id))
        }
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            None
        }
    }
}

/// Parse the declared user id out of a `/ws/{id}` request path.
fn declared_user(path: &str) -> Option<UserId> {
    path.strip_prefix("/ws/")
        .and_then(|rest| rest.trim_end_matches('/').parse::<UserId>().ok())
}
