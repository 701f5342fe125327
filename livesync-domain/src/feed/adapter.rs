//! 变更订阅适配器（ChangeFeedAdapter）
//!
//! 每个订阅对应一个后台任务：
//! - 打开通道（有父级时按 `PARENT_COLUMN = parent` 过滤）；
//! - 分区尚未初始化时拉取一次快照；
//! - 按通道顺序解码并应用变更，丢弃跨父级事件与畸形消息；
//! - 收到重连信号或通道断开后重新打开时，重新拉取快照；
//! - 退出时释放通道。
//!
use super::Subscription;
use crate::backend::{Channel, ChannelFilter, ChannelHandle, with_timeout};
use crate::change::{ChangeEvent, FeedMessage, RawChange};
use crate::collection::{CollectionStore, Resolution};
use crate::error::{SyncError, SyncResult};
use crate::filter::Filter;
use crate::record::Record;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ChangeFeedAdapter<R: Record> {
    store: Arc<CollectionStore<R>>,
}

impl<R: Record> Clone for ChangeFeedAdapter<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<R: Record> ChangeFeedAdapter<R> {
    pub fn new(store: Arc<CollectionStore<R>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CollectionStore<R>> {
        &self.store
    }

    /// 订阅分区
    ///
    /// 通道打开失败时在分区记录 `Subscription` 错误并返回该错误。
    pub async fn subscribe(&self, filter: Filter) -> SyncResult<Subscription> {
        let store = self.store.clone();
        let channel_filter = channel_filter::<R>(&filter);
        let timeout = store.config().request_timeout;

        // 保证分区存在，错误可被记录与观察
        drop(store.watch(&filter));

        let channel = match with_timeout(
            &format!("open_channel {}", R::TABLE),
            timeout,
            store
                .backend()
                .feed
                .open_channel(R::TABLE, channel_filter.as_ref()),
        )
        .await
        {
            Ok(channel) => channel,
            Err(err) => {
                let err = SyncError::subscription(R::TABLE, err.to_string());
                log::warn!("subscribe {} [{filter}] failed: {err}", R::TABLE);
                store.record_partition_error(&filter, err.clone());
                return Err(err);
            }
        };
        log::info!("subscribed {} [{filter}] on {}", R::TABLE, channel.handle);

        let token = CancellationToken::new();
        let worker = Worker {
            store,
            filter: filter.clone(),
            channel_filter,
            token: token.clone(),
        };
        let task = tokio::spawn(worker.run(channel));

        Ok(Subscription::new(R::TABLE, filter, token, task))
    }
}

fn channel_filter<R: Record>(filter: &Filter) -> Option<ChannelFilter> {
    match (R::PARENT_COLUMN, filter.parent_id()) {
        (Some(column), Some(parent)) => Some(ChannelFilter {
            column: column.to_string(),
            value: parent.to_string(),
        }),
        _ => None,
    }
}

struct Worker<R: Record> {
    store: Arc<CollectionStore<R>>,
    filter: Filter,
    channel_filter: Option<ChannelFilter>,
    token: CancellationToken,
}

impl<R: Record> Worker<R> {
    async fn run(self, channel: Channel) {
        let mut channel = Some(channel);

        tokio::select! {
            _ = self.token.cancelled() => {}
            fetched = self.store.fetch_if_uninitialized(&self.filter) => {
                if let Some(Err(err)) = fetched {
                    self.log_fetch_error(&err);
                }
            }
        }

        while let Some(current) = channel.as_mut() {
            let message = tokio::select! {
                _ = self.token.cancelled() => break,
                message = current.messages.next() => message,
            };

            match message {
                Some(Ok(FeedMessage::Change(raw))) => self.handle(raw).await,
                Some(Ok(FeedMessage::Reconnected)) => {
                    log::info!("{} [{}] reconnected, refetching", R::TABLE, self.filter);
                    self.refetch().await;
                }
                Some(Err(err)) => {
                    // 可能已丢失事件
                    log::warn!("{} [{}] channel error: {err}", R::TABLE, self.filter);
                    self.store.record_partition_error(&self.filter, err);
                    self.refetch().await;
                }
                None => {
                    let handle = current.handle;
                    log::warn!("{} [{}] channel dropped", R::TABLE, self.filter);
                    self.store.record_partition_error(
                        &self.filter,
                        SyncError::subscription(R::TABLE, "channel dropped"),
                    );
                    self.close(handle).await;

                    channel = self.reopen().await;
                    if channel.is_some() {
                        self.refetch().await;
                    }
                }
            }
        }

        if let Some(channel) = channel {
            self.close(channel.handle).await;
        }
        log::debug!("{} [{}] worker stopped", R::TABLE, self.filter);
    }

    async fn handle(&self, raw: RawChange) {
        let event = match ChangeEvent::<R>::decode(raw) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("{} [{}] skipped malformed change: {err}", R::TABLE, self.filter);
                return;
            }
        };

        if let (Some(scope), Some(parent)) = (self.filter.parent_id(), event.parent_id()) {
            if scope != parent {
                log::debug!(
                    "{} [{}] dropped change {} for parent {parent}",
                    R::TABLE,
                    self.filter,
                    event.id()
                );
                return;
            }
        }

        let resolved = match event {
            ChangeEvent::Delete { id, parent_id } => Ok(Resolution::Remove { id, parent_id }),
            ChangeEvent::Insert(payload) | ChangeEvent::Update(payload) => {
                tokio::select! {
                    _ = self.token.cancelled() => return,
                    resolved = self.store.resolve(payload) => resolved,
                }
            }
        };

        // 重新拉取期间可能已取消
        if self.token.is_cancelled() {
            return;
        }
        match resolved {
            Ok(resolution) => self.store.apply_resolution(resolution),
            Err(err) => {
                log::warn!("{} [{}] rehydration failed: {err}", R::TABLE, self.filter);
                self.store.record_partition_error(&self.filter, err);
            }
        }
    }

    async fn refetch(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            result = self.store.fetch_snapshot(&self.filter) => {
                if let Err(err) = result {
                    self.log_fetch_error(&err);
                }
            }
        }
    }

    async fn reopen(&self) -> Option<Channel> {
        let config = *self.store.config();
        let mut attempt: u32 = 0;

        loop {
            if config.max_reconnect_attempts != 0 && attempt >= config.max_reconnect_attempts {
                let err = SyncError::subscription(
                    R::TABLE,
                    format!("gave up after {attempt} reconnect attempts"),
                );
                log::warn!("{} [{}] {err}", R::TABLE, self.filter);
                self.store.record_partition_error(&self.filter, err);
                return None;
            }
            attempt += 1;

            tokio::select! {
                _ = self.token.cancelled() => return None,
                _ = tokio::time::sleep(config.reconnect_interval) => {}
            }

            let opened = with_timeout(
                &format!("open_channel {}", R::TABLE),
                config.request_timeout,
                self.store
                    .backend()
                    .feed
                    .open_channel(R::TABLE, self.channel_filter.as_ref()),
            )
            .await;
            match opened {
                Ok(channel) => {
                    log::info!(
                        "{} [{}] reopened on {} (attempt {attempt})",
                        R::TABLE,
                        self.filter,
                        channel.handle
                    );
                    return Some(channel);
                }
                Err(err) => {
                    log::warn!("{} [{}] reconnect attempt {attempt} failed: {err}", R::TABLE, self.filter);
                }
            }
        }
    }

    async fn close(&self, handle: ChannelHandle) {
        let closed = with_timeout(
            &format!("close_channel {}", R::TABLE),
            self.store.config().request_timeout,
            self.store.backend().feed.close_channel(handle),
        )
        .await;
        if let Err(err) = closed {
            log::warn!("{} [{}] close {handle} failed: {err}", R::TABLE, self.filter);
        }
    }

    fn log_fetch_error(&self, err: &SyncError) {
        if err.is_internal() {
            log::debug!("{} [{}] {err}", R::TABLE, self.filter);
        } else {
            log::warn!("{} [{}] snapshot failed: {err}", R::TABLE, self.filter);
        }
    }
}
