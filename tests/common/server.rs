//! In-process test server.
//!
//! Assembles the hub, router, and gateway against an in-memory database
//! on an ephemeral port, with declared-identity auth so tests can pick
//! their user ids freely.

use fxchatd::auth::TrustedIdentity;
use fxchatd::db::Database;
use fxchatd::hub::Hub;
use fxchatd::network::Gateway;
use fxchatd::notify::{Dispatcher, NoopPushProvider};
use fxchatd::router::Router;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct TestServer {
    pub db: Database,
    pub addr: SocketAddr,
}

impl TestServer {
    /// Spawn a full server stack on an ephemeral port.
    pub async fn spawn() -> anyhow::Result<Self> {
        let db = Database::new(":memory:").await?;

        let (hub, hub_task) = Hub::new();
        tokio::spawn(hub_task.run());

        let notifier = Arc::new(Dispatcher::new(db.clone(), Arc::new(NoopPushProvider)));
        let router = Arc::new(Router::new(db.clone(), hub.clone(), notifier));

        let gateway = Gateway::bind(
            "127.0.0.1:0".parse()?,
            hub.clone(),
            router,
            Arc::new(TrustedIdentity),
            db.clone(),
        )
        .await?;
        let addr = gateway.local_addr()?;
        tokio::spawn(gateway.run());

        Ok(Self { db, addr })
    }

    /// WebSocket URL for connecting as the given user.
    pub fn ws_url(&self, user_id: i64) -> String {
        format!("ws://{}/ws/{}", self.addr, user_id)
    }
}
