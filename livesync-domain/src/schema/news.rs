use super::ProfileSummary;
use chrono::{DateTime, Utc};
use livesync_macros::record;

#[record(
    table = "news",
    columns = "*, author:profiles!author_id(id, display_name, avatar_url)",
    order_by(published_at),
    required(title, body, author_id),
    enriched(author = author_id)
)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub author_id: String,
    pub published_at: DateTime<Utc>,
    pub author: Option<ProfileSummary>,
}

/// 帖子评论，按帖子划分
#[record(
    table = "comments",
    columns = "*, author:profiles!user_id(id, display_name, avatar_url)",
    parent = post_id,
    order_by(created_at),
    required(post_id, user_id, body),
    enriched(author = user_id)
)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<ProfileSummary>,
}

#[record(
    table = "likes",
    parent = post_id,
    order_by(created_at),
    required(post_id, user_id)
)]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// 用户发布的图片/视频，按作者划分
#[record(
    table = "media_posts",
    columns = "*, author:profiles!author_id(id, display_name, avatar_url)",
    parent = author_id,
    order_by(created_at),
    required(author_id, media_url),
    enriched(author = author_id)
)]
pub struct MediaPost {
    pub id: String,
    pub author_id: String,
    pub caption: Option<String>,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<ProfileSummary>,
}
