//! Database helpers for posts, likes, and reports.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct PostRow {
    pub(crate) id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) author_handle: String,
    pub(crate) author_avatar: Option<String>,
    pub(crate) content: String,
    pub(crate) images: Vec<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) likes_count: i64,
    pub(crate) is_liked: bool,
    pub(crate) comments_count: i64,
}

// $1 is always the viewing account so like status can be computed per row.
const POST_QUERY: &str = r"
    SELECT p.id, p.author_id, p.content, p.images, p.created_at,
           a.handle AS author_handle, a.avatar AS author_avatar,
           (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS likes_count,
           EXISTS(
               SELECT 1 FROM post_likes pl
               WHERE pl.post_id = p.id AND pl.account_id = $1
           ) AS is_liked,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id AND NOT c.hidden) AS comments_count
    FROM posts p
    JOIN accounts a ON a.id = p.author_id
";

fn post_from_row(row: &PgRow) -> PostRow {
    PostRow {
        id: row.get("id"),
        author_id: row.get("author_id"),
        author_handle: row.get("author_handle"),
        author_avatar: row.get("author_avatar"),
        content: row.get("content"),
        images: row.get("images"),
        created_at: row.get("created_at"),
        likes_count: row.get("likes_count"),
        is_liked: row.get("is_liked"),
        comments_count: row.get("comments_count"),
    }
}

pub(crate) async fn insert_post(
    pool: &PgPool,
    author: Uuid,
    content: &str,
    images: &[String],
) -> Result<Uuid> {
    let query = r"
        INSERT INTO posts (author_id, content, images)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(author)
        .bind(content)
        .bind(images)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert post")?;
    Ok(row.get("id"))
}

/// Feed for `viewer`: newest first, hidden posts and blocked authors filtered.
pub(crate) async fn feed(
    pool: &PgPool,
    viewer: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostRow>> {
    let query = format!(
        r"{POST_QUERY}
        WHERE NOT p.hidden
          AND p.author_id NOT IN (SELECT blocked_id FROM blocks WHERE blocker_id = $1)
        ORDER BY p.created_at DESC
        LIMIT $2 OFFSET $3
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
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load feed")?;
    Ok(rows.iter().map(post_from_row).collect())
}

pub(crate) async fn post_by_id(pool: &PgPool, viewer: Uuid, id: Uuid) -> Result<Option<PostRow>> {
    let query = format!("{POST_QUERY} WHERE p.id = $2 AND NOT p.hidden");
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
        .context("failed to load post")?;
    Ok(row.as_ref().map(post_from_row))
}

pub(crate) async fn posts_by_author(
    pool: &PgPool,
    viewer: Uuid,
    author: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostRow>> {
    let query = format!(
        r"{POST_QUERY}
        WHERE p.author_id = $2 AND NOT p.hidden
        ORDER BY p.created_at DESC
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
        .bind(author)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load author posts")?;
    Ok(rows.iter().map(post_from_row).collect())
}

pub(crate) async fn is_liked(pool: &PgPool, post: Uuid, account: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM post_likes WHERE post_id = $1 AND account_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(post)
        .bind(account)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check post like")?;
    Ok(row.is_some())
}

pub(crate) async fn insert_like(pool: &PgPool, post: Uuid, account: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO post_likes (post_id, account_id)
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
        .bind(post)
        .bind(account)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert post like")?;
    Ok(())
}

pub(crate) async fn delete_like(pool: &PgPool, post: Uuid, account: Uuid) -> Result<()> {
    let query = "DELETE FROM post_likes WHERE post_id = $1 AND account_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(post)
        .bind(account)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete post like")?;
    Ok(())
}

pub(crate) async fn like_count(pool: &PgPool, post: Uuid) -> Result<i64> {
    let query = "SELECT COUNT(*) AS count FROM post_likes WHERE post_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(post)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count post likes")?;
    Ok(row.get("count"))
}

/// Delete a post and its dependents (comments and likes cascade via FK).
pub(crate) async fn delete_post(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = "DELETE FROM posts WHERE id = $1";
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
        .context("failed to delete post")?;
    Ok(())
}

pub(crate) async fn has_reported(pool: &PgPool, post: Uuid, account: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM post_reports WHERE post_id = $1 AND account_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(post)
        .bind(account)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check post report")?;
    Ok(row.is_some())
}

pub(crate) async fn insert_report(
    pool: &PgPool,
    post: Uuid,
    account: Uuid,
    reason: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO post_reports (post_id, account_id, reason)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(post)
        .bind(account)
        .bind(reason)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert post report")?;
    Ok(())
}
