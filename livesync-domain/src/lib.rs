//! 实时同步与乐观状态协调层（livesync-domain）
//!
//! 面向“赛事 / 球队 / 资讯”类移动客户端，为托管后端的数据提供本地权威副本：
//! - 记录（`record`）与实体结构（`schema`），由 `#[record(...)]` 宏生成 `Record` 实现
//! - 过滤条件 / 分区键（`filter`）与已校验的变更事件（`change`）
//! - 集合存储（`collection`）：快照拉取、变更合并、分区状态与观察
//! - 变更订阅（`feed`）：通道生命周期、重新拉取与断线重连
//! - 变更门面（`mutation`）：本地校验后的增删改
//! - 外部协作方协议（`backend`）：查询、变更通道、写入；`memory` 特性提供进程内实现
//!
//! 典型用法：
//! 1. 以某个 `Backend` 与 `SyncConfig` 构造 `CollectionStore<R>`（通常由组合根统一完成）；
//! 2. 通过 `ChangeFeedAdapter::subscribe` 订阅分区，首次订阅会拉取快照；
//! 3. 视图通过 `CollectionStore::watch` 读取 `CollectionSnapshot`；
//! 4. 写操作经 `MutationFacade`，成功后立即合并服务端返回的实体。
//!
pub mod backend;
pub mod change;
pub mod collection;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod mutation;
pub mod record;
pub mod schema;

// 允许在本 crate 内部通过 ::livesync_domain 进行自引用，
// 以便 #[record] 生成的路径在本 crate 内同样可解析。
extern crate self as livesync_domain;
