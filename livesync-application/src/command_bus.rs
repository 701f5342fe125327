use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;

/// 命令总线（Command Bus）
///
/// 根据命令的具体类型路由到对应的处理器，并原样返回处理结果。
#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn dispatch<C>(&self, ctx: &AppContext, cmd: C) -> Result<C::Output, AppError>
    where
        C: Command;
}
