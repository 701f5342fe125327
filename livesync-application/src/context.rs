use crate::error::AppError;
use bon::Builder;

/// 应用层上下文（Application Context）
///
/// 承载一次命令调用的横切信息：
/// - 当前登录用户（`user_id`），由认证层在调用前填入；
/// - 关联追踪 `correlation_id`，仅用于日志。
///
/// 典型用法：
/// ```rust
/// use livesync_application::context::AppContext;
///
/// let ctx = AppContext::builder()
///     .user_id("u-1")
///     .correlation_id("cor-123")
///     .build();
/// assert_eq!(ctx.require_user().unwrap(), "u-1");
/// ```
#[derive(Clone, Debug, Default, Builder)]
pub struct AppContext {
    #[builder(into)]
    pub user_id: Option<String>,
    #[builder(into)]
    pub correlation_id: Option<String>,
}

impl AppContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            correlation_id: None,
        }
    }

    /// 当前用户；未登录时返回 `Unauthenticated`
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AppError::Unauthenticated)
    }
}
