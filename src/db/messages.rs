//! Message repository.
//!
//! Messages are immutable once persisted; creation time is server-assigned
//! at receipt.

use super::DbError;
use crate::proto::{ChannelId, ChannelMessageRecord, PeerMessageRecord, UserId};
use sqlx::SqlitePool;

/// Messages per page for channel history listings.
pub const CHANNEL_PAGE_SIZE: i64 = 50;

/// A page of channel messages, newest first.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelMessagePage {
    pub messages: Vec<ChannelMessageRecord>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

/// Repository for message persistence and history queries.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a peer message and return the stored record.
    pub async fn insert_peer(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
        created_at: i64,
    ) -> Result<PeerMessageRecord, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO peer_messages (sender_id, receiver_id, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .bind(created_at)
        .execute(self.pool)
        .await?;

        Ok(PeerMessageRecord {
            id: result.last_insert_rowid(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at,
        })
    }

    /// Persist a channel message and return the stored record.
    pub async fn insert_channel(
        &self,
        channel_id: ChannelId,
        sender_id: UserId,
        content: &str,
        created_at: i64,
    ) -> Result<ChannelMessageRecord, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO channel_messages (channel_id, sender_id, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(sender_id)
        .bind(content)
        .bind(created_at)
        .execute(self.pool)
        .await?;

        Ok(ChannelMessageRecord {
            id: result.last_insert_rowid(),
            channel_id,
            sender_id,
            content: content.to_string(),
            created_at,
        })
    }

    /// Full conversation between two users, oldest first.
    pub async fn peer_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<PeerMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, String, i64)>(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at
            FROM peer_messages
            WHERE (sender_id = ? AND receiver_id = ?)
               OR (sender_id = ? AND receiver_id = ?)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, sender_id, receiver_id, content, created_at)| PeerMessageRecord {
                    id,
                    sender_id,
                    receiver_id,
                    content,
                    created_at,
                },
            )
            .collect())
    }

    /// One page of a channel's messages, newest first. Pages are 1-based.
    pub async fn channel_page(
        &self,
        channel_id: ChannelId,
        page: i64,
    ) -> Result<ChannelMessagePage, DbError> {
        let page = page.max(1);

        let (total,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM channel_messages WHERE channel_id = ?"#,
        )
        .bind(channel_id)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, (i64, i64, i64, String, i64)>(
            r#"
            SELECT id, channel_id, sender_id, content, created_at
            FROM channel_messages
            WHERE channel_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(channel_id)
        .bind(CHANNEL_PAGE_SIZE)
        .bind((page - 1) * CHANNEL_PAGE_SIZE)
        .fetch_all(self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(
                |(id, channel_id, sender_id, content, created_at)| ChannelMessageRecord {
                    id,
                    channel_id,
                    sender_id,
                    content,
                    created_at,
                },
            )
            .collect();

        Ok(ChannelMessagePage {
            messages,
            total,
            page,
            pages: (total as u64).div_ceil(CHANNEL_PAGE_SIZE as u64) as i64,
        })
    }
}
