//! Notification dispatcher - best-effort push delivery.
//!
//! Runs fully off the fan-out critical path: every dispatch is a detached
//! task whose completion is never awaited. Each attempt appends one
//! history record; tokens the provider reports as invalid are purged so
//! they are not retried.

use crate::db::Database;
use crate::proto::UserId;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum content preview length in a peer-message notification body.
pub const PEER_PREVIEW_LEN: usize = 100;

/// Maximum content preview length in a channel-message notification body.
pub const CHANNEL_PREVIEW_LEN: usize = 80;

/// Push provider errors. Transient failures are distinguishable from
/// per-token invalid destinations, which arrive as receipts.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned malformed response: {0}")]
    MalformedResponse(String),
}

/// Per-token delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// Stale or unknown destination; the token should be purged.
    InvalidToken,
    Failed(String),
}

/// Delivery receipt for one destination token.
#[derive(Debug, Clone)]
pub struct TokenReceipt {
    pub token: String,
    pub outcome: PushOutcome,
}

/// The notification to deliver.
#[derive(Debug, Clone)]
pub struct PushNote {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// External push provider contract: batched send, per-token receipts.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn push(&self, tokens: &[String], note: &PushNote) -> Result<Vec<TokenReceipt>, PushError>;
}

/// Expo-style push provider over HTTP.
pub struct ExpoPushProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ExpoTicketDetails>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicketDetails {
    #[serde(default)]
    error: Option<String>,
}

impl ExpoPushProvider {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl PushProvider for ExpoPushProvider {
    async fn push(&self, tokens: &[String], note: &PushNote) -> Result<Vec<TokenReceipt>, PushError> {
        let payload = serde_json::json!({
            "to": tokens,
            "title": note.title,
            "body": note.body,
            "data": note.data,
            "sound": "default",
            "priority": "default",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::Transport(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        let body: ExpoResponse = response
            .json()
            .await
            .map_err(|e| PushError::MalformedResponse(e.to_string()))?;

        if body.data.len() != tokens.len() {
            return Err(PushError::MalformedResponse(format!(
                "{} tickets for {} tokens",
                body.data.len(),
                tokens.len()
            )));
        }

        Ok(tokens
            .iter()
            .zip(body.data)
            .map(|(token, ticket)| {
                let outcome = if ticket.status == "ok" {
                    PushOutcome::Delivered
                } else if ticket
                    .details
                    .as_ref()
                    .and_then(|d| d.error.as_deref())
                    .is_some_and(|e| e == "DeviceNotRegistered" || e == "InvalidCredentials")
                {
                    PushOutcome::InvalidToken
                } else {
                    PushOutcome::Failed(ticket.message.unwrap_or_else(|| ticket.status.clone()))
                };
                TokenReceipt {
                    token: token.clone(),
                    outcome,
                }
            })
            .collect())
    }
}

/// Provider used when no push endpoint is configured. Accepts every
/// notification without delivering anything.
pub struct NoopPushProvider;

#[async_trait]
impl PushProvider for NoopPushProvider {
    async fn push(&self, tokens: &[String], note: &PushNote) -> Result<Vec<TokenReceipt>, PushError> {
        debug!(devices = tokens.len(), title = %note.title, "Push disabled, notification not delivered");
        Ok(tokens
            .iter()
            .map(|token| TokenReceipt {
                token: token.clone(),
                outcome: PushOutcome::Delivered,
            })
            .collect())
    }
}

/// Dispatches notifications to a user's registered devices.
pub struct Dispatcher {
    db: Database,
    provider: Arc<dyn PushProvider>,
}

impl Dispatcher {
    pub fn new(db: Database, provider: Arc<dyn PushProvider>) -> Self {
        Self { db, provider }
    }

    /// Fire-and-forget dispatch. Failures are logged and absorbed; the
    /// caller never observes them.
    pub fn spawn_notify(self: &Arc<Self>, user_id: UserId, note: PushNote) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.notify_user(user_id, note).await;
        });
    }

    /// Deliver one notification to every device of a user, recording one
    /// history row for the attempt and purging invalid tokens.
    pub async fn notify_user(&self, user_id: UserId, note: PushNote) {
        let tokens = match self.db.devices().tokens_for_user(user_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load device tokens");
                return;
            }
        };

        if tokens.is_empty() {
            debug!(user_id, "No devices registered, skipping notification");
            crate::metrics::record_notification("skipped");
            return;
        }

        let result = self.provider.push(&tokens, &note).await;

        let status = match &result {
            Ok(receipts) => {
                if receipts
                    .iter()
                    .all(|r| r.outcome == PushOutcome::Delivered)
                {
                    "sent"
                } else {
                    "failed"
                }
            }
            Err(e) => {
                warn!(user_id, error = %e, "Push provider request failed");
                "failed"
            }
        };
        crate::metrics::record_notification(status);

        let payload = note.data.to_string();
        if let Err(e) = self
            .db
            .devices()
            .record_notification(
                user_id,
                &note.title,
                &note.body,
                &payload,
                status,
                chrono::Utc::now().timestamp(),
            )
            .await
        {
            warn!(user_id, error = %e, "Failed to record notification history");
        }

        // Purge destinations the provider reported as permanently invalid
        if let Ok(receipts) = &result {
            for receipt in receipts {
                if receipt.outcome == PushOutcome::InvalidToken {
                    match self.db.devices().remove_token(&receipt.token).await {
                        Ok(()) => debug!(token = %receipt.token, "Purged invalid push token"),
                        Err(e) => {
                            warn!(token = %receipt.token, error = %e, "Failed to purge invalid token")
                        }
                    }
                }
            }
        }
    }
}

/// Truncate message content to a notification preview, ellipsized.
/// Cuts on a char boundary at or below `max` total characters.
pub fn preview(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_string();
    }
    let cut: String = content.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
