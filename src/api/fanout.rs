//! Notification fan-out: persist first, then push to the recipient's room.

use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::api::handlers::notifications::storage::{insert_notification, NotificationKind};
use crate::api::hub::NotificationHub;
use crate::auth::Principal;

pub(crate) struct Fanout<'a> {
    pub(crate) recipient: Uuid,
    pub(crate) kind: NotificationKind,
    pub(crate) message: String,
    pub(crate) post_id: Option<Uuid>,
    pub(crate) comment_id: Option<Uuid>,
    pub(crate) sender: &'a Principal,
}

/// Persist a notification row and push a realtime frame to the recipient.
///
/// The row is the source of truth; the push is best-effort and can never fail
/// the caller.
///
/// # Errors
/// Returns an error only when the insert fails.
pub(crate) async fn dispatch(
    pool: &PgPool,
    hub: &NotificationHub,
    fanout: Fanout<'_>,
) -> Result<()> {
    let (id, created_at) = insert_notification(
        pool,
        fanout.recipient,
        fanout.sender.account_id,
        fanout.kind,
        fanout.post_id,
        fanout.comment_id,
        &fanout.message,
    )
    .await?;

    let frame = json!({
        "type": "notification",
        "id": id.to_string(),
        "kind": fanout.kind.as_str(),
        "message": fanout.message,
        "createdAt": created_at.to_rfc3339(),
        "sender": {
            "handle": fanout.sender.handle,
            "avatar": fanout.sender.avatar,
        },
        "postId": fanout.post_id.map(|id| id.to_string()),
        "commentId": fanout.comment_id.map(|id| id.to_string()),
    });
    hub.push(fanout.recipient, &frame.to_string());
    debug!(recipient = %fanout.recipient, kind = fanout.kind.as_str(), "notification dispatched");

    Ok(())
}
