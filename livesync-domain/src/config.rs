//! 同步配置
//!
use bon::Builder;
use std::time::Duration;

/// 插入/更新事件是否需要按 id 重新拉取完整行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RehydrationPolicy {
    /// 每次插入/更新都重新拉取（变更载荷的完整性不作假设）
    #[default]
    Always,
    /// 仅在载荷不完整或内嵌数据缺失时拉取
    WhenIncomplete,
    /// 从不拉取；部分载荷合并到已缓存的实体上
    Never,
}

/// 集合存储与订阅适配器的配置
#[derive(Debug, Clone, Copy, Builder)]
pub struct SyncConfig {
    /// 每次网络调用的时限
    #[builder(default = Duration::from_secs(15))]
    pub request_timeout: Duration,
    #[builder(default)]
    pub rehydration: RehydrationPolicy,
    /// 变更成功后是否立即将服务端返回的实体合并进集合
    #[builder(default = true)]
    pub optimistic_mutations: bool,
    /// 通道断开后的重连间隔
    #[builder(default = Duration::from_secs(2))]
    pub reconnect_interval: Duration,
    /// 最大重连次数，0 表示不限
    #[builder(default = 0)]
    pub max_reconnect_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
