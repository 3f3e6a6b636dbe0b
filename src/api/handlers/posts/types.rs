//! Request/response types for post endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::PostRow;
use crate::api::handlers::comments::CommentBody;

/// Maximum length of a post body.
pub(crate) const POST_MAX_CHARS: usize = 500;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: Option<String>,
    /// Image URLs already hosted by the image collaborator.
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct PostAuthor {
    pub id: String,
    pub handle: String,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
    pub id: String,
    pub author: PostAuthor,
    pub content: String,
    pub images: Vec<String>,
    pub created_at: String,
    pub is_liked: bool,
    pub likes_count: i64,
    pub comments_count: i64,
}

impl From<PostRow> for PostBody {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id.to_string(),
            author: PostAuthor {
                id: row.author_id.to_string(),
                handle: row.author_handle,
                avatar: row.author_avatar,
            },
            content: row.content,
            images: row.images,
            created_at: row.created_at.to_rfc3339(),
            is_liked: row.is_liked,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct CreatePostResponse {
    pub message: String,
    pub post: PostBody,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub posts: Vec<PostBody>,
    pub current_page: i64,
    pub has_more: bool,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct PostDetailResponse {
    pub post: PostDetailBody,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PostDetailBody {
    pub post: PostBody,
    pub comments: Vec<CommentBody>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub message: String,
    pub is_liked: bool,
    pub likes_count: i64,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ReportPostRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
