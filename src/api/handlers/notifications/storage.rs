//! Database helpers for notification rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Notification categories, stored as lowercase text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NotificationKind {
    Like,
    Comment,
    Follow,
    Reply,
    Mention,
}

impl NotificationKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Follow => "follow",
            Self::Reply => "reply",
            Self::Mention => "mention",
        }
    }
}

pub(crate) struct NotificationRow {
    pub(crate) id: Uuid,
    pub(crate) kind: String,
    pub(crate) message: String,
    pub(crate) read: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) sender_handle: String,
    pub(crate) sender_avatar: Option<String>,
    pub(crate) post_id: Option<Uuid>,
    pub(crate) comment_id: Option<Uuid>,
}

pub(crate) async fn insert_notification(
    pool: &PgPool,
    recipient: Uuid,
    sender: Uuid,
    kind: NotificationKind,
    post_id: Option<Uuid>,
    comment_id: Option<Uuid>,
    message: &str,
) -> Result<(Uuid, DateTime<Utc>)> {
    let query = r"
        INSERT INTO notifications (recipient_id, sender_id, kind, post_id, comment_id, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(recipient)
        .bind(sender)
        .bind(kind.as_str())
        .bind(post_id)
        .bind(comment_id)
        .bind(message)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert notification")?;
    Ok((row.get("id"), row.get("created_at")))
}

pub(crate) async fn list_notifications(
    pool: &PgPool,
    recipient: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<NotificationRow>> {
    let query = r"
        SELECT n.id, n.kind, n.message, n.read, n.created_at,
               n.post_id, n.comment_id,
               a.handle AS sender_handle, a.avatar AS sender_avatar
        FROM notifications n
        JOIN accounts a ON a.id = n.sender_id
        WHERE n.recipient_id = $1
        ORDER BY n.created_at DESC
        LIMIT $2 OFFSET $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(recipient)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list notifications")?;

    Ok(rows
        .into_iter()
        .map(|row| NotificationRow {
            id: row.get("id"),
            kind: row.get("kind"),
            message: row.get("message"),
            read: row.get("read"),
            created_at: row.get("created_at"),
            sender_handle: row.get("sender_handle"),
            sender_avatar: row.get("sender_avatar"),
            post_id: row.get("post_id"),
            comment_id: row.get("comment_id"),
        })
        .collect())
}

pub(crate) async fn unread_count(pool: &PgPool, recipient: Uuid) -> Result<i64> {
    let query = "SELECT COUNT(*) AS count FROM notifications WHERE recipient_id = $1 AND NOT read";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(recipient)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count unread notifications")?;
    Ok(row.get("count"))
}

/// Mark one notification read; false when it does not exist or belongs to
/// someone else.
pub(crate) async fn mark_read(pool: &PgPool, recipient: Uuid, id: Uuid) -> Result<bool> {
    let query = "UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(recipient)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark notification read")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_all_read(pool: &PgPool, recipient: Uuid) -> Result<u64> {
    let query = "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(recipient)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark notifications read")?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_notification(pool: &PgPool, recipient: Uuid, id: Uuid) -> Result<bool> {
    let query = "DELETE FROM notifications WHERE id = $1 AND recipient_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(recipient)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete notification")?;
    Ok(result.rows_affected() > 0)
}
