//! Database helpers for comments, replies, and comment likes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct CommentRow {
    pub(crate) id: Uuid,
    pub(crate) post_id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) author_handle: String,
    pub(crate) author_avatar: Option<String>,
    pub(crate) parent_id: Option<Uuid>,
    pub(crate) content: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) likes_count: i64,
    pub(crate) is_liked: bool,
}

/// Ownership and threading facts needed before mutating a comment.
pub(crate) struct CommentMeta {
    pub(crate) post_id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) parent_id: Option<Uuid>,
}

// $1 is always the viewing account.
const COMMENT_QUERY: &str = r"
    SELECT c.id, c.post_id, c.author_id, c.parent_id, c.content, c.created_at,
           a.handle AS author_handle, a.avatar AS author_avatar,
           (SELECT COUNT(*) FROM comment_likes cl WHERE cl.comment_id = c.id) AS likes_count,
           EXISTS(
               SELECT 1 FROM comment_likes cl
               WHERE cl.comment_id = c.id AND cl.account_id = $1
           ) AS is_liked
    FROM comments c
    JOIN accounts a ON a.id = c.author_id
";

fn comment_from_row(row: &PgRow) -> CommentRow {
    CommentRow {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_handle: row.get("author_handle"),
        author_avatar: row.get("author_avatar"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        likes_count: row.get("likes_count"),
        is_liked: row.get("is_liked"),
    }
}

pub(crate) async fn insert_comment(
    pool: &PgPool,
    post: Uuid,
    author: Uuid,
    parent: Option<Uuid>,
    content: &str,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO comments (post_id, author_id, parent_id, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(post)
        .bind(author)
        .bind(parent)
        .bind(content)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert comment")?;
    Ok(row.get("id"))
}

pub(crate) async fn comment_meta(pool: &PgPool, id: Uuid) -> Result<Option<CommentMeta>> {
    let query = "SELECT post_id, author_id, parent_id FROM comments WHERE id = $1 AND NOT hidden";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load comment meta")?;
    Ok(row.map(|row| CommentMeta {
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        parent_id: row.get("parent_id"),
    }))
}

pub(crate) async fn load_comment(pool: &PgPool, viewer: Uuid, id: Uuid) -> Result<Option<CommentRow>> {
    let query = format!("{COMMENT_QUERY} WHERE c.id = $2 AND NOT c.hidden");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(viewer)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load comment")?;
    Ok(row.as_ref().map(comment_from_row))
}

/// Top-level comments of a post, newest first.
pub(crate) async fn comments_for_post(
    pool: &PgPool,
    viewer: Uuid,
    post: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<CommentRow>> {
    let query = format!(
        r"{COMMENT_QUERY}
        WHERE c.post_id = $2 AND c.parent_id IS NULL AND NOT c.hidden
        ORDER BY c.created_at DESC
        LIMIT $3 OFFSET $4
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(viewer)
        .bind(post)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load comments")?;
    Ok(rows.iter().map(comment_from_row).collect())
}

/// Replies under any of `parents`, oldest first so threads read downward.
pub(crate) async fn replies_for(
    pool: &PgPool,
    viewer: Uuid,
    parents: &[Uuid],
) -> Result<Vec<CommentRow>> {
    if parents.is_empty() {
        return Ok(Vec::new());
    }
    let query = format!(
        r"{COMMENT_QUERY}
        WHERE c.parent_id = ANY($2) AND NOT c.hidden
        ORDER BY c.created_at ASC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(viewer)
        .bind(parents)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load replies")?;
    Ok(rows.iter().map(comment_from_row).collect())
}

pub(crate) async fn is_liked(pool: &PgPool, comment: Uuid, account: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM comment_likes WHERE comment_id = $1 AND account_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(comment)
        .bind(account)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check comment like")?;
    Ok(row.is_some())
}

pub(crate) async fn insert_like(pool: &PgPool, comment: Uuid, account: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO comment_likes (comment_id, account_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(comment)
        .bind(account)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert comment like")?;
    Ok(())
}

pub(crate) async fn delete_like(pool: &PgPool, comment: Uuid, account: Uuid) -> Result<()> {
    let query = "DELETE FROM comment_likes WHERE comment_id = $1 AND account_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(comment)
        .bind(account)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete comment like")?;
    Ok(())
}

pub(crate) async fn like_count(pool: &PgPool, comment: Uuid) -> Result<i64> {
    let query = "SELECT COUNT(*) AS count FROM comment_likes WHERE comment_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(comment)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count comment likes")?;
    Ok(row.get("count"))
}

/// Delete a comment and its replies (replies cascade via FK).
pub(crate) async fn delete_comment(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = "DELETE FROM comments WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete comment")?;
    Ok(())
}
