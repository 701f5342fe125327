use super::{loaded, non_blank};
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::error::AppError;
use crate::registry::StoreRegistry;
use async_trait::async_trait;
use chrono::Utc;
use livesync_domain::filter::Filter;
use livesync_domain::schema::{Comment, Like};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PostComment {
    pub post_id: String,
    pub body: String,
}

impl Command for PostComment {
    const NAME: &'static str = "PostComment";
    type Output = Comment;
}

/// 切换点赞状态；返回切换后是否已赞
#[derive(Debug, Clone)]
pub struct ToggleLike {
    pub post_id: String,
}

impl Command for ToggleLike {
    const NAME: &'static str = "ToggleLike";
    type Output = bool;
}

pub struct NewsHandlers {
    registry: Arc<StoreRegistry>,
}

impl NewsHandlers {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandHandler<PostComment> for NewsHandlers {
    async fn handle(&self, ctx: &AppContext, cmd: PostComment) -> Result<Comment, AppError> {
        let user_id = ctx.require_user()?;
        let post_id = non_blank("post_id", &cmd.post_id)?;
        let body = non_blank("body", &cmd.body)?;

        let comment = self
            .registry
            .facade::<Comment>()
            .create(json!({
                "post_id": post_id,
                "user_id": user_id,
                "body": body,
                "created_at": Utc::now(),
            }))
            .await?;
        Ok(comment)
    }
}

#[async_trait]
impl CommandHandler<ToggleLike> for NewsHandlers {
    async fn handle(&self, ctx: &AppContext, cmd: ToggleLike) -> Result<bool, AppError> {
        let user_id = ctx.require_user()?;
        let post_id = non_blank("post_id", &cmd.post_id)?;

        let likes = loaded(self.registry.likes(), &Filter::parent(post_id)).await?;
        let facade = self.registry.facade::<Like>();

        match likes.items.iter().find(|l| l.user_id == user_id) {
            Some(like) => {
                facade.delete(&like.id).await?;
                Ok(false)
            }
            None => {
                facade
                    .create(json!({
                        "post_id": post_id,
                        "user_id": user_id,
                        "created_at": Utc::now(),
                    }))
                    .await?;
                Ok(true)
            }
        }
    }
}
