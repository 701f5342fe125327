#![allow(dead_code)]

use async_trait::async_trait;
use livesync_domain::backend::{
    Backend, Channel, ChannelFilter, ChannelHandle, ChangeFeed, MemoryBackend, QuerySource,
    SelectQuery,
};
use livesync_domain::collection::{CollectionSnapshot, CollectionStore};
use livesync_domain::config::SyncConfig;
use livesync_domain::error::SyncResult;
use livesync_domain::record::Record;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

pub fn event_row(id: &str, start: &str) -> Value {
    json!({
        "id": id,
        "title": format!("event {id}"),
        "starts_at": format!("2025-05-01T{start}:00Z"),
        "status": "scheduled",
        "created_by": "u-1",
    })
}

pub fn member_row(id: &str, team: &str, minute: u32) -> Value {
    json!({
        "id": id,
        "team_id": team,
        "user_id": format!("user-{id}"),
        "role": "member",
        "joined_at": format!("2025-01-01T10:{minute:02}:00Z"),
    })
}

pub fn store<R: Record>(backend: Backend, config: SyncConfig) -> Arc<CollectionStore<R>> {
    Arc::new(CollectionStore::new(backend, config))
}

pub fn memory_store<R: Record>(memory: &MemoryBackend, config: SyncConfig) -> Arc<CollectionStore<R>> {
    memory.register_record::<R>();
    store(Backend::from_shared(Arc::new(memory.clone())), config)
}

pub fn ids<R: Record>(snapshot: &CollectionSnapshot<R>) -> Vec<String> {
    snapshot.items.iter().map(|r| r.id().to_string()).collect()
}

/// 等待分区满足条件
pub async fn wait_for<R, F>(
    rx: &mut watch::Receiver<CollectionSnapshot<R>>,
    mut predicate: F,
) -> CollectionSnapshot<R>
where
    R: Record,
    F: FnMut(&CollectionSnapshot<R>) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for collection state")
        .expect("store dropped")
        .clone()
}

pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

type Pending<T> = Mutex<VecDeque<oneshot::Receiver<SyncResult<T>>>>;

/// 可由测试控制完成时机的查询源；队列为空时回落到内存后端
pub struct GatedQuery {
    inner: MemoryBackend,
    selects: Pending<Vec<Value>>,
    select_ones: Pending<Option<Value>>,
    select_started: AtomicUsize,
    select_one_started: AtomicUsize,
}

impl GatedQuery {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            selects: Mutex::new(VecDeque::new()),
            select_ones: Mutex::new(VecDeque::new()),
            select_started: AtomicUsize::new(0),
            select_one_started: AtomicUsize::new(0),
        }
    }

    pub fn gate_select(&self) -> oneshot::Sender<SyncResult<Vec<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.selects.lock().unwrap().push_back(rx);
        tx
    }

    pub fn gate_select_one(&self) -> oneshot::Sender<SyncResult<Option<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.select_ones.lock().unwrap().push_back(rx);
        tx
    }

    pub fn select_started(&self) -> usize {
        self.select_started.load(Ordering::SeqCst)
    }

    pub fn select_one_started(&self) -> usize {
        self.select_one_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySource for GatedQuery {
    async fn select(&self, query: &SelectQuery) -> SyncResult<Vec<Value>> {
        let gate = self.selects.lock().unwrap().pop_front();
        self.select_started.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            },
            None => self.inner.select(query).await,
        }
    }

    async fn select_one(&self, table: &str, columns: &str, id: &str) -> SyncResult<Option<Value>> {
        let gate = self.select_ones.lock().unwrap().pop_front();
        self.select_one_started.fetch_add(1, Ordering::SeqCst);
        match gate {
            Some(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            },
            None => self.inner.select_one(table, columns, id).await,
        }
    }
}

/// 忽略服务端过滤的变更通道，模拟投递异常的传输层
pub struct UnfilteredFeed(pub MemoryBackend);

#[async_trait]
impl ChangeFeed for UnfilteredFeed {
    async fn open_channel(&self, table: &str, _filter: Option<&ChannelFilter>) -> SyncResult<Channel> {
        self.0.open_channel(table, None).await
    }

    async fn close_channel(&self, handle: ChannelHandle) -> SyncResult<()> {
        self.0.close_channel(handle).await
    }
}
