/// 应用层命令（Command）
///
/// 表达用户意图的写操作，例如报名赛事、申请入队、点赞。
/// - `NAME`：稳定名称，用于日志与路由，避免依赖 `type_name::<T>()`；
/// - `Output`：执行成功后返回给调用方的结果（通常是服务端确认的实体）。
pub trait Command: Send + Sync + 'static {
    const NAME: &'static str;

    type Output: Send + 'static;
}
