//! Channel repository.
//!
//! Handles channel creation, membership and admin join tables, and the
//! membership lookup used by the post-registration subscription preload.

use super::DbError;
use crate::proto::{ChannelId, UserId};
use sqlx::SqlitePool;

/// A persisted channel.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Repository for channel operations.
pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    /// Create a new channel repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a channel, adding the creator as both member and admin.
    ///
    /// The channel row and both association rows are written in a single
    /// transaction; a failure leaves no partial channel behind.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        creator: UserId,
    ) -> Result<ChannelRecord, DbError> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO channels (name, description, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let channel_id = result.last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(creator)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO channel_admins (channel_id, user_id, granted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(creator)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChannelRecord {
            id: channel_id,
            name: name.to_string(),
            description: description.map(String::from),
            created_at: now,
        })
    }

    /// Find channel by ID.
    pub async fn find_by_id(&self, id: ChannelId) -> Result<Option<ChannelRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>, i64)>(
            r#"
            SELECT id, name, description, created_at
            FROM channels
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, name, description, created_at)| ChannelRecord {
            id,
            name,
            description,
            created_at,
        }))
    }

    /// List all channels.
    pub async fn list_all(&self) -> Result<Vec<ChannelRecord>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, i64)>(
            r#"
            SELECT id, name, description, created_at
            FROM channels
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description, created_at)| ChannelRecord {
                id,
                name,
                description,
                created_at,
            })
            .collect())
    }

    /// Add a user to a channel's member list. Joining twice is a no-op.
    pub async fn add_member(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), DbError> {
        if self.find_by_id(channel_id).await?.is_none() {
            return Err(DbError::ChannelNotFound(channel_id));
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// List member user ids for a channel.
    pub async fn members(&self, channel_id: ChannelId) -> Result<Vec<UserId>, DbError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT user_id FROM channel_members
            WHERE channel_id = ?
            ORDER BY joined_at
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// List admin user ids for a channel.
    pub async fn admins(&self, channel_id: ChannelId) -> Result<Vec<UserId>, DbError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT user_id FROM channel_admins
            WHERE channel_id = ?
            ORDER BY granted_at
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Grant channel admin to a user.
    ///
    /// Rejects a duplicate grant. Also ensures a membership row exists so
    /// the admin set stays a subset of the member set.
    pub async fn add_admin(&self, channel_id: ChannelId, user_id: UserId) -> Result<(), DbError> {
        if self.find_by_id(channel_id).await?.is_none() {
            return Err(DbError::ChannelNotFound(channel_id));
        }

        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM channel_admins
            WHERE channel_id = ? AND user_id = ?
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if count > 0 {
            return Err(DbError::AlreadyAdmin(channel_id, user_id));
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO channel_admins (channel_id, user_id, granted_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Revoke channel admin from a user.
    pub async fn remove_admin(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM channel_admins
            WHERE channel_id = ? AND user_id = ?
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotAnAdmin(channel_id, user_id));
        }

        Ok(())
    }

    /// Check whether a user is currently an admin of a channel.
    ///
    /// This is the one domain rule checked synchronously on the message
    /// hot path, so it is a single indexed lookup.
    pub async fn is_admin(&self, channel_id: ChannelId, user_id: UserId) -> Result<bool, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM channel_admins
            WHERE channel_id = ? AND user_id = ?
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Channel ids a user is a member of, for the subscription preload.
    pub async fn channel_ids_for_user(&self, user_id: UserId) -> Result<Vec<ChannelId>, DbError> {
        let rows = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT c.id
            FROM channels c
            JOIN channel_members m ON m.channel_id = c.id
            WHERE m.user_id = ?
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, DbError};

    #[tokio::test]
    async fn create_adds_creator_as_member_and_admin() {
        let db = Database::new(":memory:").await.unwrap();
        let channel = db
            .channels()
            .create("signals", Some("daily calls"), 1)
            .await
            .unwrap();

        assert_eq!(db.channels().members(channel.id).await.unwrap(), vec![1]);
        assert_eq!(db.channels().admins(channel.id).await.unwrap(), vec![1]);
        assert!(db.channels().is_admin(channel.id, 1).await.unwrap());
        assert!(!db.channels().is_admin(channel.id, 2).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_admin_grant_is_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        let channel = db.channels().create("signals", None, 1).await.unwrap();

        db.channels().add_admin(channel.id, 2).await.unwrap();
        let err = db.channels().add_admin(channel.id, 2).await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyAdmin(_, 2)));

        // Cardinality unchanged by the rejected grant
        assert_eq!(db.channels().admins(channel.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn admin_grant_implies_membership() {
        let db = Database::new(":memory:").await.unwrap();
        let channel = db.channels().create("signals", None, 1).await.unwrap();

        db.channels().add_admin(channel.id, 5).await.unwrap();
        assert!(db.channels().members(channel.id).await.unwrap().contains(&5));
    }

    #[tokio::test]
    async fn join_is_idempotent_and_feeds_preload_query() {
        let db = Database::new(":memory:").await.unwrap();
        let a = db.channels().create("a", None, 1).await.unwrap();
        let b = db.channels().create("b", None, 1).await.unwrap();

        db.channels().add_member(a.id, 7).await.unwrap();
        db.channels().add_member(a.id, 7).await.unwrap();
        db.channels().add_member(b.id, 7).await.unwrap();

        assert_eq!(
            db.channels().channel_ids_for_user(7).await.unwrap(),
            vec![a.id, b.id]
        );
    }

    #[tokio::test]
    async fn join_unknown_channel_fails() {
        let db = Database::new(":memory:").await.unwrap();
        let err = db.channels().add_member(42, 7).await.unwrap_err();
        assert!(matches!(err, DbError::ChannelNotFound(42)));
    }

    #[tokio::test]
    async fn remove_admin_requires_existing_grant() {
        let db = Database::new(":memory:").await.unwrap();
        let channel = db.channels().create("signals", None, 1).await.unwrap();

        let err = db.channels().remove_admin(channel.id, 9).await.unwrap_err();
        assert!(matches!(err, DbError::NotAnAdmin(_, 9)));

        db.channels().remove_admin(channel.id, 1).await.unwrap();
        assert!(!db.channels().is_admin(channel.id, 1).await.unwrap());
    }
}
