//! 变更订阅（feed）
//!
//! 将集合存储的某个分区与后端变更通道绑定：
//! 边界校验、按通道顺序应用、断线重连后重新拉取快照。
//!
mod adapter;
mod subscription;

pub use adapter::ChangeFeedAdapter;
pub use subscription::Subscription;
