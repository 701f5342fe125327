//! 外部协作方协议（backend）
//!
//! 集合存储只通过三个窄接口访问托管后端：
//! - `QuerySource`：快照查询与按 id 的单行查询（重新拉取）；
//! - `ChangeFeed`：按表（可选按外键过滤）打开/关闭变更通道；
//! - `MutationSink`：插入、更新、删除，返回服务端确认后的行。
//!
//! 行以 `serde_json::Value` 传递，具体传输（HTTP、WebSocket 等）由上层实现并注入。
//!
#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::{Embed, MemoryBackend};

use crate::change::FeedMessage;
use crate::error::{RemoteError, SyncResult};
use crate::filter::Filter;
use async_trait::async_trait;
use bon::Builder;
use futures_core::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 快照查询
#[derive(Debug, Clone, Builder)]
pub struct SelectQuery {
    #[builder(into)]
    table: String,
    #[builder(into, default = "*".to_string())]
    columns: String,
    #[builder(default)]
    filter: Filter,
    /// `filter` 中父级 id 对应的列
    parent_column: Option<&'static str>,
    #[builder(default)]
    order_by: Vec<&'static str>,
}

impl SelectQuery {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &str {
        &self.columns
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn parent_column(&self) -> Option<&'static str> {
        self.parent_column
    }

    pub fn order_by(&self) -> &[&'static str] {
        &self.order_by
    }
}

/// 变更通道的服务端过滤（`column=eq.value`）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelFilter {
    pub column: String,
    pub value: String,
}

impl fmt::Display for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u64);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// 已建立的变更通道
pub struct Channel {
    pub handle: ChannelHandle,
    /// 'static 生命周期的消息流，便于在 tokio::spawn 中消费；流结束表示通道断开
    pub messages: BoxStream<'static, SyncResult<FeedMessage>>,
}

/// 查询接口
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> SyncResult<Vec<Value>>;

    async fn select_one(&self, table: &str, columns: &str, id: &str) -> SyncResult<Option<Value>>;
}

/// 变更订阅接口
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn open_channel(&self, table: &str, filter: Option<&ChannelFilter>)
    -> SyncResult<Channel>;

    async fn close_channel(&self, handle: ChannelHandle) -> SyncResult<()>;
}

/// 变更接口
#[async_trait]
pub trait MutationSink: Send + Sync {
    async fn insert(&self, table: &str, row: Value) -> SyncResult<Value>;

    async fn update(&self, table: &str, id: &str, patch: Value) -> SyncResult<Value>;

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()>;
}

/// 三个协作方的组合，由组合根构造后注入各集合存储
#[derive(Clone)]
pub struct Backend {
    pub query: Arc<dyn QuerySource>,
    pub feed: Arc<dyn ChangeFeed>,
    pub mutations: Arc<dyn MutationSink>,
}

impl Backend {
    pub fn new(
        query: Arc<dyn QuerySource>,
        feed: Arc<dyn ChangeFeed>,
        mutations: Arc<dyn MutationSink>,
    ) -> Self {
        Self {
            query,
            feed,
            mutations,
        }
    }

    /// 由同时实现三个接口的单一实现构造
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: QuerySource + ChangeFeed + MutationSink + 'static,
    {
        Self {
            query: backend.clone(),
            feed: backend.clone(),
            mutations: backend,
        }
    }
}

/// 为网络调用加上时限，超时以 `RemoteErrorKind::Timeout` 呈现
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::timeout(operation, limit).into()),
    }
}
