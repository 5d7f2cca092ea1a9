//! Device token and notification history repository.
//!
//! Devices hold push destination tokens, one row per registered device.
//! Notification history is append-only: one row per dispatch attempt,
//! never mutated, kept for observability of the best-effort path.

use super::DbError;
use crate::proto::UserId;
use sqlx::SqlitePool;

/// One notification dispatch attempt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub payload: String,
    pub status: String,
    pub sent_at: i64,
}

/// Repository for device tokens and notification history.
pub struct DeviceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DeviceRepository<'a> {
    /// Create a new device repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a push token for a user. Re-registering the same token
    /// moves it to the given user.
    pub async fn register(&self, user_id: UserId, token: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO devices (user_id, token, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// All push tokens registered for a user.
    pub async fn tokens_for_user(&self, user_id: UserId) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"SELECT token FROM devices WHERE user_id = ? ORDER BY id"#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Purge a stale token the provider reported as invalid.
    pub async fn remove_token(&self, token: &str) -> Result<(), DbError> {
        sqlx::query(r#"DELETE FROM devices WHERE token = ?"#)
            .bind(token)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Append a notification history record.
    pub async fn record_notification(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        payload: &str,
        status: &str,
        sent_at: i64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO notification_history (user_id, title, body, payload, status, sent_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(body)
        .bind(payload)
        .bind(status)
        .bind(sent_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Notification history for a user, newest first.
    pub async fn history_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<NotificationRecord>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, String, String, String, i64)>(
            r#"
            SELECT id, user_id, title, body, payload, status, sent_at
            FROM notification_history
            WHERE user_id = ?
            ORDER BY sent_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, user_id, title, body, payload, status, sent_at)| NotificationRecord {
                    id,
                    user_id,
                    title,
                    body,
                    payload,
                    status,
                    sent_at,
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn token_lifecycle() {
        let db = Database::new(":memory:").await.unwrap();

        db.devices().register(1, "tok-a").await.unwrap();
        db.devices().register(1, "tok-b").await.unwrap();
        assert_eq!(
            db.devices().tokens_for_user(1).await.unwrap(),
            vec!["tok-a".to_string(), "tok-b".to_string()]
        );

        db.devices().remove_token("tok-a").await.unwrap();
        assert_eq!(
            db.devices().tokens_for_user(1).await.unwrap(),
            vec!["tok-b".to_string()]
        );
    }

    #[tokio::test]
    async fn reregistered_token_moves_between_users() {
        let db = Database::new(":memory:").await.unwrap();

        db.devices().register(1, "tok").await.unwrap();
        db.devices().register(2, "tok").await.unwrap();

        assert!(db.devices().tokens_for_user(1).await.unwrap().is_empty());
        assert_eq!(db.devices().tokens_for_user(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_is_appended_newest_first() {
        let db = Database::new(":memory:").await.unwrap();

        db.devices()
            .record_notification(1, "t1", "b1", "{}", "sent", 100)
            .await
            .unwrap();
        db.devices()
            .record_notification(1, "t2", "b2", "{}", "failed", 200)
            .await
            .unwrap();

        let history = db.devices().history_for_user(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "t2");
        assert_eq!(history[0].status, "failed");
    }
}
