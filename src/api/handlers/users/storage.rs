//! Database helpers for profiles and the follow/block graph.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct ProfileRow {
    pub(crate) id: Uuid,
    pub(crate) handle: String,
    pub(crate) avatar: Option<String>,
    pub(crate) post_count: i64,
    pub(crate) follower_count: i64,
    pub(crate) following_count: i64,
}

const PROFILE_QUERY: &str = r"
    SELECT a.id, a.handle, a.avatar,
           (SELECT COUNT(*) FROM posts p WHERE p.author_id = a.id AND NOT p.hidden) AS post_count,
           (SELECT COUNT(*) FROM follows f WHERE f.followee_id = a.id) AS follower_count,
           (SELECT COUNT(*) FROM follows f WHERE f.follower_id = a.id) AS following_count
    FROM accounts a
";

fn profile_from_row(row: &sqlx::postgres::PgRow) -> ProfileRow {
    ProfileRow {
        id: row.get("id"),
        handle: row.get("handle"),
        avatar: row.get("avatar"),
        post_count: row.get("post_count"),
        follower_count: row.get("follower_count"),
        following_count: row.get("following_count"),
    }
}

pub(crate) async fn profile_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ProfileRow>> {
    let query = format!("{PROFILE_QUERY} WHERE a.id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load profile")?;
    Ok(row.as_ref().map(profile_from_row))
}

pub(crate) async fn profile_by_handle(pool: &PgPool, handle: &str) -> Result<Option<ProfileRow>> {
    let query = format!("{PROFILE_QUERY} WHERE a.handle = $1 AND a.verified AND a.active");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(handle)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load profile by handle")?;
    Ok(row.as_ref().map(profile_from_row))
}

/// True when a verified account other than `excluding` owns `handle`.
pub(crate) async fn handle_taken(pool: &PgPool, handle: &str, excluding: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM accounts WHERE handle = $1 AND verified AND id <> $2 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(handle)
        .bind(excluding)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check handle uniqueness")?;
    Ok(row.is_some())
}

pub(crate) async fn update_profile(
    pool: &PgPool,
    id: Uuid,
    handle: Option<&str>,
    avatar: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET handle = COALESCE($2, handle),
            avatar = COALESCE($3, avatar),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(handle)
        .bind(avatar)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(())
}

pub(crate) async fn account_exists(pool: &PgPool, id: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM accounts WHERE id = $1 AND active LIMIT 1";
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
        .context("failed to check account")?;
    Ok(row.is_some())
}

pub(crate) async fn is_following(pool: &PgPool, follower: Uuid, followee: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(follower)
        .bind(followee)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check follow edge")?;
    Ok(row.is_some())
}

pub(crate) async fn insert_follow(pool: &PgPool, follower: Uuid, followee: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO follows (follower_id, followee_id)
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
        .bind(follower)
        .bind(followee)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert follow edge")?;
    Ok(())
}

pub(crate) async fn delete_follow(pool: &PgPool, follower: Uuid, followee: Uuid) -> Result<()> {
    let query = "DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(follower)
        .bind(followee)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete follow edge")?;
    Ok(())
}

pub(crate) async fn is_blocked(pool: &PgPool, blocker: Uuid, blocked: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM blocks WHERE blocker_id = $1 AND blocked_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(blocker)
        .bind(blocked)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check block edge")?;
    Ok(row.is_some())
}

/// Block and sever the follow edges in both directions, atomically.
pub(crate) async fn insert_block(pool: &PgPool, blocker: Uuid, blocked: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin block transaction")?;

    let query = "INSERT INTO blocks (blocker_id, blocked_id) VALUES ($1, $2) ON CONFLICT DO NOTHING";
    sqlx::query(query)
        .bind(blocker)
        .bind(blocked)
        .execute(&mut *tx)
        .await
        .context("failed to insert block edge")?;

    let query = r"
        DELETE FROM follows
        WHERE (follower_id = $1 AND followee_id = $2)
           OR (follower_id = $2 AND followee_id = $1)
    ";
    sqlx::query(query)
        .bind(blocker)
        .bind(blocked)
        .execute(&mut *tx)
        .await
        .context("failed to sever follow edges")?;

    tx.commit().await.context("commit block transaction")?;
    Ok(())
}

pub(crate) async fn delete_block(pool: &PgPool, blocker: Uuid, blocked: Uuid) -> Result<()> {
    let query = "DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(blocker)
        .bind(blocked)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete block edge")?;
    Ok(())
}

pub(crate) async fn search_handles(
    pool: &PgPool,
    needle: &str,
    limit: i64,
) -> Result<Vec<(String, Option<String>)>> {
    // Escape LIKE wildcards so a user-provided needle matches literally.
    let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let pattern = format!("%{escaped}%");
    let query = r"
        SELECT handle, avatar
        FROM accounts
        WHERE handle ILIKE $1 AND verified AND active
        ORDER BY handle ASC
        LIMIT $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(pattern)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to search handles")?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("handle"), row.get("avatar")))
        .collect())
}
