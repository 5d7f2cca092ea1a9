//! Minimal WebSocket test client.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect and wait for the connection-established confirmation.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (stream, _) = connect_async(url).await?;
        let mut client = Self { stream };
        let frame = client.recv_json(Duration::from_secs(5)).await?;
        anyhow::ensure!(
            frame["type"] == "connection_established",
            "expected connection_established, got {frame}"
        );
        Ok(client)
    }

    /// Send one raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Receive the next text frame as JSON, with a timeout.
    pub async fn recv_json(&mut self, timeout: Duration) -> anyhow::Result<serde_json::Value> {
        loop {
            let message = tokio::time::timeout(timeout, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for frame"))?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => anyhow::bail!("unexpected message: {other:?}"),
            }
        }
    }

    /// True when no frame arrives within the window.
    pub async fn expect_silence(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.stream.next()).await.is_err()
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
