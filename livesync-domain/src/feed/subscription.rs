use crate::filter::Filter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 订阅句柄
///
/// 取消后不再向集合存储应用任何事件（包括晚到的重新拉取结果）；
/// 句柄被丢弃时自动取消。
pub struct Subscription {
    table: &'static str,
    filter: Filter,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        table: &'static str,
        filter: Filter,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            table,
            filter,
            token,
            task: Some(task),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// 取消订阅；可重复调用
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            log::info!("unsubscribe {} [{}]", self.table, self.filter);
            self.token.cancel();
        }
    }

    /// 未取消且后台任务仍在运行
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 取消并等待后台任务退出（通道此时已释放）
    pub async fn join(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
