//! 内存版后端（MemoryBackend）
//!
//! 同时实现 `QuerySource`、`ChangeFeed`、`MutationSink` 的进程内后端：
//! - 每张表一份 `id -> row` 的有序映射；
//! - 写入后通过 `tokio::sync::broadcast` 推送变更，通道按外键列过滤；
//! - 推送的变更只含基础列，查询结果则按登记的 `Embed` 解析内嵌实体，
//!   与托管后端“变更载荷不完整”的行为一致；
//! - 支持故障注入、断线与重连信号，便于测试与本地演示。
//!
//! 注意：若某表当前无订阅者，推送会被忽略。

use super::{Channel, ChannelFilter, ChannelHandle, ChangeFeed, MutationSink, QuerySource, SelectQuery};
use crate::change::{FeedMessage, Operation, RawChange};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::record::Record;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

type Row = Map<String, Value>;

/// 查询时解析的内嵌实体：`alias` = `target_table[row[foreign_key]]` 的投影
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub foreign_key: String,
    pub target_table: String,
    pub alias: String,
    pub columns: Vec<String>,
}

impl Embed {
    /// 从查询投影中解析内嵌声明，形如 `*, author:profiles!user_id(id, display_name)`
    pub fn parse_projection(columns: &str) -> Vec<Embed> {
        split_top_level(columns)
            .into_iter()
            .filter_map(|part| {
                let (alias, rest) = part.split_once(':')?;
                let (target, rest) = rest.split_once('!')?;
                let (foreign_key, rest) = rest.split_once('(')?;
                let inner = rest.strip_suffix(')')?;
                Some(Embed {
                    foreign_key: foreign_key.trim().to_string(),
                    target_table: target.trim().to_string(),
                    alias: alias.trim().to_string(),
                    columns: inner
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                })
            })
            .collect()
    }
}

// 按不在括号内的逗号切分
fn split_top_level(columns: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in columns.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(columns[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(columns[start..].trim());
    parts
}

struct OpenChannel {
    table: String,
    token: CancellationToken,
}

struct Inner {
    capacity: usize,
    tables: DashMap<String, BTreeMap<String, Row>>,
    embeds: DashMap<String, Vec<Embed>>,
    feeds: DashMap<String, broadcast::Sender<FeedMessage>>,
    channels: DashMap<u64, OpenChannel>,
    next_channel: AtomicU64,
    failures: DashMap<&'static str, RemoteError>,
    calls: DashMap<&'static str, usize>,
}

/// 进程内后端
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MemoryBackend {
    /// `capacity` 为每张表变更广播的缓冲区容量
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                tables: DashMap::new(),
                embeds: DashMap::new(),
                feeds: DashMap::new(),
                channels: DashMap::new(),
                next_channel: AtomicU64::new(1),
                failures: DashMap::new(),
                calls: DashMap::new(),
            }),
        }
    }

    /// 登记 `table` 查询结果中的内嵌实体
    pub fn register_embed(&self, table: &str, embed: Embed) {
        self.inner
            .embeds
            .entry(table.to_string())
            .or_default()
            .push(embed);
    }

    /// 按 `R::COLUMNS` 中的投影登记内嵌实体
    pub fn register_record<R: Record>(&self) {
        for embed in Embed::parse_projection(R::COLUMNS) {
            self.register_embed(R::TABLE, embed);
        }
    }

    /// 直接写入行，不推送变更
    pub fn seed<I>(&self, table: &str, rows: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        for row in rows {
            let row = as_row(row)?;
            let id = row_id(&row)?;
            self.inner
                .tables
                .entry(table.to_string())
                .or_default()
                .insert(id, row);
        }
        Ok(())
    }

    /// 读取基础行（不解析内嵌）
    pub fn row(&self, table: &str, id: &str) -> Option<Value> {
        self.inner
            .tables
            .get(table)
            .and_then(|t| t.get(id).cloned())
            .map(Value::Object)
    }

    pub fn len(&self, table: &str) -> usize {
        self.inner.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    /// 直接推送一条原始变更（不修改表数据）
    pub fn emit(&self, change: RawChange) {
        let sender = self.feed(&change.table);
        let _ = sender.send(FeedMessage::Change(change));
    }

    /// 通知该表的所有通道：传输层已重连
    pub fn signal_reconnect(&self, table: &str) {
        let _ = self.feed(table).send(FeedMessage::Reconnected);
    }

    /// 模拟断线：结束该表所有已打开通道的消息流
    pub fn drop_channels(&self, table: &str) {
        let handles: Vec<u64> = self
            .inner
            .channels
            .iter()
            .filter(|c| c.value().table == table)
            .map(|c| *c.key())
            .collect();
        for handle in handles {
            if let Some((_, channel)) = self.inner.channels.remove(&handle) {
                channel.token.cancel();
            }
        }
    }

    /// 当前仍打开的通道数
    pub fn open_channels(&self, table: &str) -> usize {
        self.inner
            .channels
            .iter()
            .filter(|c| c.value().table == table)
            .count()
    }

    /// 令下一次 `operation` 调用失败
    ///
    /// `operation` 取值：`select`、`select_one`、`open_channel`、`insert`、`update`、`delete`
    pub fn fail_next(&self, operation: &'static str, error: RemoteError) {
        self.inner.failures.insert(operation, error);
    }

    /// 某类调用的累计次数
    pub fn calls(&self, operation: &'static str) -> usize {
        self.inner.calls.get(&operation).map(|c| *c).unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> SyncResult<()> {
        *self.inner.calls.entry(operation).or_insert(0) += 1;
        match self.inner.failures.remove(&operation) {
            Some((_, err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn feed(&self, table: &str) -> broadcast::Sender<FeedMessage> {
        self.inner
            .feeds
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }

    fn publish(&self, table: &str, operation: Operation, new: Option<&Row>, old: Option<&Row>) {
        self.emit(RawChange {
            table: table.to_string(),
            operation,
            new: new.cloned().map(Value::Object),
            old: old.cloned().map(Value::Object),
        });
    }

    fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn enrich(&self, table: &str, mut row: Row) -> Row {
        let embeds = self
            .inner
            .embeds
            .get(table)
            .map(|e| e.clone())
            .unwrap_or_default();

        for embed in embeds {
            let target = row
                .get(&embed.foreign_key)
                .and_then(Value::as_str)
                .and_then(|fk| self.row(&embed.target_table, fk));
            let projected = match target {
                Some(Value::Object(target)) => Value::Object(
                    embed
                        .columns
                        .iter()
                        .filter_map(|c| target.get(c).map(|v| (c.clone(), v.clone())))
                        .collect(),
                ),
                _ => Value::Null,
            };
            row.insert(embed.alias, projected);
        }
        row
    }
}

#[async_trait]
impl QuerySource for MemoryBackend {
    async fn select(&self, query: &SelectQuery) -> SyncResult<Vec<Value>> {
        self.enter("select")?;
        let rows = self
            .rows(query.table())
            .into_iter()
            .filter(|row| query.filter().matches_row(query.parent_column(), row))
            .map(|row| Value::Object(self.enrich(query.table(), row)))
            .collect();
        Ok(rows)
    }

    async fn select_one(&self, table: &str, _columns: &str, id: &str) -> SyncResult<Option<Value>> {
        self.enter("select_one")?;
        let row = self
            .inner
            .tables
            .get(table)
            .and_then(|t| t.get(id).cloned());
        Ok(row.map(|row| Value::Object(self.enrich(table, row))))
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn open_channel(
        &self,
        table: &str,
        filter: Option<&ChannelFilter>,
    ) -> SyncResult<Channel> {
        self.enter("open_channel")?;

        let handle = self.inner.next_channel.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner.channels.insert(
            handle,
            OpenChannel {
                table: table.to_string(),
                token: token.clone(),
            },
        );

        let filter = filter.cloned();
        let table_name = table.to_string();
        let messages = BroadcastStream::new(self.feed(table).subscribe())
            .filter_map(move |item| {
                let out = match item {
                    Ok(msg) if passes(filter.as_ref(), &msg) => Some(Ok(msg)),
                    Ok(_) => None,
                    Err(e) => Some(Err(SyncError::subscription(table_name.clone(), e.to_string()))),
                };
                ready(out)
            })
            .take_until(token.cancelled_owned());

        Ok(Channel {
            handle: ChannelHandle(handle),
            messages: Box::pin(messages),
        })
    }

    async fn close_channel(&self, handle: ChannelHandle) -> SyncResult<()> {
        self.enter("close_channel")?;
        if let Some((_, channel)) = self.inner.channels.remove(&handle.0) {
            channel.token.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl MutationSink for MemoryBackend {
    async fn insert(&self, table: &str, row: Value) -> SyncResult<Value> {
        self.enter("insert")?;
        let mut row = as_row(row)?;
        let id = match row_id(&row) {
            Ok(id) => id,
            Err(_) => {
                let id = uuid::Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        {
            let mut rows = self.inner.tables.entry(table.to_string()).or_default();
            if rows.contains_key(&id) {
                return Err(RemoteError::backend(
                    "duplicate key value violates unique constraint",
                    Some("23505".to_string()),
                )
                .into());
            }
            rows.insert(id, row.clone());
        }

        self.publish(table, Operation::Insert, Some(&row), None);
        Ok(Value::Object(row))
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> SyncResult<Value> {
        self.enter("update")?;
        let patch = as_row(patch)?;

        let row = {
            let mut rows = self.inner.tables.entry(table.to_string()).or_default();
            let Some(row) = rows.get_mut(id) else {
                return Err(RemoteError::backend(
                    format!("row {id} not found in {table}"),
                    Some("PGRST116".to_string()),
                )
                .into());
            };
            for (column, value) in patch {
                if column != "id" {
                    row.insert(column, value);
                }
            }
            row.clone()
        };

        let mut old = Row::new();
        old.insert("id".to_string(), Value::String(id.to_string()));
        self.publish(table, Operation::Update, Some(&row), Some(&old));
        Ok(Value::Object(row))
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        self.enter("delete")?;
        let removed = self
            .inner
            .tables
            .get_mut(table)
            .and_then(|mut rows| rows.remove(id));
        if let Some(old) = removed {
            self.publish(table, Operation::Delete, None, Some(&old));
        }
        Ok(())
    }
}

// 模拟服务端过滤：行中缺少过滤列（如仅含 id 的删除）时照常投递
fn passes(filter: Option<&ChannelFilter>, msg: &FeedMessage) -> bool {
    let (Some(filter), FeedMessage::Change(raw)) = (filter, msg) else {
        return true;
    };
    let row = raw.new.as_ref().or(raw.old.as_ref());
    match row.and_then(|r| r.get(&filter.column)) {
        Some(Value::String(v)) => *v == filter.value,
        Some(other) => other.to_string() == filter.value,
        None => true,
    }
}

fn as_row(value: Value) -> SyncResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(RemoteError::backend(format!("expected object row, got {other}"), None).into()),
    }
}

fn row_id(row: &Row) -> SyncResult<String> {
    match row.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SyncError::decode("row without usable `id`")),
    }
}
