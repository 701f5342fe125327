//! 集合存储（CollectionStore）
//!
//! 某一实体类型的本地权威副本，按 `Filter` 划分为若干分区：
//! - `fetch_snapshot`：拉取快照，代号过期的结果静默丢弃；
//! - `apply_change_event`：先按策略重新拉取完整行，再按 id 替换/插入/删除；
//! - `mutate`：调用远端变更，成功后（可选）立即合并服务端返回的实体；
//! - 读取：`snapshot` / `get` / `watch` / `partitions`。
//!
//! 分区状态存放于 `DashMap`，任何锁都不会跨越 await。
//!
use super::partition::Partition;
use super::{CollectionSnapshot, LoadPhase, OrderedUniqueList};
use crate::backend::{Backend, SelectQuery, with_timeout};
use crate::change::{ChangeEvent, Payload};
use crate::config::{RehydrationPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::filter::Filter;
use crate::record::Record;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;

/// 远端变更请求
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert(Value),
    Update { id: String, patch: Value },
    Delete { id: String },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// 插入/更新事件解析后的落地动作
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<R> {
    /// 合并该实体
    Upsert(R),
    /// 行已不可见，按删除处理
    Remove { id: String, parent_id: Option<String> },
    /// 无可合并的内容
    Skip,
}

pub struct CollectionStore<R: Record> {
    backend: Backend,
    config: SyncConfig,
    partitions: DashMap<Filter, Partition<R>>,
}

impl<R: Record> CollectionStore<R> {
    pub fn new(backend: Backend, config: SyncConfig) -> Self {
        Self {
            backend,
            config,
            partitions: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn table(&self) -> &'static str {
        R::TABLE
    }

    /// 拉取分区快照
    ///
    /// 若期间又发起了更新的拉取，本次结果被丢弃并返回 `StaleResultDiscarded`。
    /// 失败时分区进入 `Errored`，原有条目保持不变。
    pub async fn fetch_snapshot(&self, filter: &Filter) -> SyncResult<()> {
        let issued = self
            .partitions
            .entry(filter.clone())
            .or_insert_with(|| Partition::new(filter.clone()))
            .begin_fetch();
        self.complete_fetch(filter, issued).await
    }

    /// 仅当分区处于 `Uninitialized` 时拉取快照；否则返回 `None`
    pub async fn fetch_if_uninitialized(&self, filter: &Filter) -> Option<SyncResult<()>> {
        let issued = {
            let mut partition = self
                .partitions
                .entry(filter.clone())
                .or_insert_with(|| Partition::new(filter.clone()));
            if partition.phase() != LoadPhase::Uninitialized {
                return None;
            }
            partition.begin_fetch()
        };
        Some(self.complete_fetch(filter, issued).await)
    }

    async fn complete_fetch(&self, filter: &Filter, issued: u64) -> SyncResult<()> {
        let query = SelectQuery::builder()
            .table(R::TABLE)
            .columns(R::COLUMNS)
            .filter(filter.clone())
            .maybe_parent_column(R::PARENT_COLUMN)
            .order_by(R::ORDER_BY.to_vec())
            .build();
        let result = with_timeout(
            &format!("select {}", R::TABLE),
            self.config.request_timeout,
            self.backend.query.select(&query),
        )
        .await
        .and_then(decode_rows::<R>);

        if let Err(err) = &result {
            log::warn!("snapshot of {} [{filter}] failed: {err}", R::TABLE);
        }

        let outcome = match self.partitions.get_mut(filter) {
            Some(mut partition) => partition.finish_fetch(issued, result),
            None => Ok(()),
        };
        if let Err(err @ SyncError::StaleResultDiscarded { .. }) = &outcome {
            log::debug!("{} [{filter}]: {err}", R::TABLE);
        }
        outcome
    }

    /// 应用一条已校验的变更事件
    pub async fn apply_change_event(&self, event: ChangeEvent<R>) -> SyncResult<()> {
        let parent = event.parent_id().map(str::to_string);
        let resolution = match event {
            ChangeEvent::Delete { id, parent_id } => Resolution::Remove { id, parent_id },
            ChangeEvent::Insert(payload) | ChangeEvent::Update(payload) => {
                match self.resolve(payload).await {
                    Ok(resolution) => resolution,
                    Err(err) => {
                        self.record_scoped_error(parent.as_deref(), err.clone());
                        return Err(err);
                    }
                }
            }
        };
        self.apply_resolution(resolution);
        Ok(())
    }

    /// 按重新拉取策略将插入/更新载荷解析为落地动作（不修改状态）
    pub async fn resolve(&self, payload: Payload<R>) -> SyncResult<Resolution<R>> {
        let policy = self.config.rehydration;
        match payload {
            Payload::Complete(record) => match policy {
                RehydrationPolicy::Always => self.rehydrate(record.id(), record.parent_id()).await,
                RehydrationPolicy::WhenIncomplete if !record.is_hydrated() => {
                    self.rehydrate(record.id(), record.parent_id()).await
                }
                _ => Ok(Resolution::Upsert(record)),
            },
            Payload::Partial {
                id,
                parent_id,
                fields,
            } => match policy {
                RehydrationPolicy::Never => self.patch_cached(&id, fields),
                _ => self.rehydrate(&id, parent_id.as_deref()).await,
            },
        }
    }

    /// 落地解析结果
    pub fn apply_resolution(&self, resolution: Resolution<R>) {
        match resolution {
            Resolution::Upsert(record) => self.merge(record),
            Resolution::Remove { id, parent_id } => self.remove(&id, parent_id.as_deref()),
            Resolution::Skip => {}
        }
    }

    /// 调用远端变更；成功时返回服务端确认的实体（删除为 `None`）
    ///
    /// 失败只记录到该实体所属父级的分区；父级未知时只记录到不限父级的分区。
    pub async fn mutate(&self, mutation: Mutation) -> SyncResult<Option<R>> {
        let kind = mutation.kind();
        let parent = self.mutation_parent(&mutation);
        match self.send(mutation).await {
            Ok(confirmed) => Ok(confirmed),
            Err(err) => {
                log::warn!("{kind} on {} failed: {err}", R::TABLE);
                self.record_mutation_error(parent.as_deref(), err.clone());
                Err(err)
            }
        }
    }

    /// 按 id 读取单行并合并进命中的分区；行不可见时从各分区移除并返回 `None`
    pub async fn fetch_one(&self, id: &str) -> SyncResult<Option<R>> {
        match self.rehydrate(id, None).await? {
            Resolution::Upsert(record) => {
                self.merge(record.clone());
                Ok(Some(record))
            }
            Resolution::Remove { id, parent_id } => {
                self.remove(&id, parent_id.as_deref());
                Ok(None)
            }
            Resolution::Skip => Ok(None),
        }
    }

    pub fn snapshot(&self, filter: &Filter) -> CollectionSnapshot<R> {
        self.partitions
            .get(filter)
            .map(|p| p.snapshot())
            .unwrap_or_default()
    }

    pub fn phase(&self, filter: &Filter) -> LoadPhase {
        self.partitions
            .get(filter)
            .map(|p| p.phase())
            .unwrap_or_default()
    }

    /// 在任一分区中按 id 查找
    pub fn get(&self, id: &str) -> Option<R> {
        self.partitions
            .iter()
            .find_map(|p| p.items().get(id).cloned())
    }

    /// 观察分区变化；分区不存在时以 `Uninitialized` 创建
    pub fn watch(&self, filter: &Filter) -> watch::Receiver<CollectionSnapshot<R>> {
        self.partitions
            .entry(filter.clone())
            .or_insert_with(|| Partition::new(filter.clone()))
            .subscribe()
    }

    pub fn clear_error(&self, filter: &Filter) {
        if let Some(mut partition) = self.partitions.get_mut(filter) {
            partition.clear_error();
        }
    }

    pub fn partitions(&self) -> Vec<Filter> {
        self.partitions.iter().map(|p| p.key().clone()).collect()
    }

    /// 在指定分区记录错误，条目保持不变
    pub fn record_partition_error(&self, filter: &Filter, error: SyncError) {
        if let Some(mut partition) = self.partitions.get_mut(filter) {
            partition.set_error(error);
        }
    }

    // 插入取行内的父级列，更新/删除取缓存实体的父级
    fn mutation_parent(&self, mutation: &Mutation) -> Option<String> {
        match mutation {
            Mutation::Insert(row) => R::PARENT_COLUMN
                .and_then(|column| row.get(column))
                .and_then(Value::as_str)
                .map(str::to_string),
            Mutation::Update { id, .. } | Mutation::Delete { id } => self
                .get(id)
                .and_then(|cached| cached.parent_id().map(str::to_string)),
        }
    }

    fn record_mutation_error(&self, parent: Option<&str>, error: SyncError) {
        for mut partition in self.partitions.iter_mut() {
            let hit = match (partition.filter().parent_id(), parent) {
                (None, _) => true,
                (Some(scoped), Some(parent)) => scoped == parent,
                (Some(_), None) => false,
            };
            if hit {
                partition.set_error(error.clone());
            }
        }
    }

    // 父级已知时只记录到同父级（或不限父级）的分区
    fn record_scoped_error(&self, parent: Option<&str>, error: SyncError) {
        for mut partition in self.partitions.iter_mut() {
            if in_scope(partition.filter(), parent) {
                partition.set_error(error.clone());
            }
        }
    }

    async fn send(&self, mutation: Mutation) -> SyncResult<Option<R>> {
        let timeout = self.config.request_timeout;
        let mutations = &self.backend.mutations;

        let row = match mutation {
            Mutation::Insert(row) => {
                with_timeout(
                    &format!("insert {}", R::TABLE),
                    timeout,
                    mutations.insert(R::TABLE, row),
                )
                .await?
            }
            Mutation::Update { id, patch } => {
                with_timeout(
                    &format!("update {}", R::TABLE),
                    timeout,
                    mutations.update(R::TABLE, &id, patch),
                )
                .await?
            }
            Mutation::Delete { id } => {
                with_timeout(
                    &format!("delete {}", R::TABLE),
                    timeout,
                    mutations.delete(R::TABLE, &id),
                )
                .await?;
                if self.config.optimistic_mutations {
                    self.remove(&id, None);
                }
                return Ok(None);
            }
        };

        let record = self.confirmed(row).await?;
        if self.config.optimistic_mutations {
            self.merge(record.clone());
        }
        Ok(Some(record))
    }

    // 服务端返回的行不一定带有投影中的内嵌列，无法解码时按 id 重新拉取
    async fn confirmed(&self, row: Value) -> SyncResult<R> {
        match serde_json::from_value::<R>(row.clone()) {
            Ok(record) => Ok(record),
            Err(err) => {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SyncError::from(err))?;
                match self.rehydrate(id, None).await? {
                    Resolution::Upsert(record) => Ok(record),
                    _ => Err(SyncError::NotFound {
                        reason: format!("{} row {id} not visible after write", R::TABLE),
                    }),
                }
            }
        }
    }

    async fn rehydrate(&self, id: &str, parent_id: Option<&str>) -> SyncResult<Resolution<R>> {
        let row = with_timeout(
            &format!("select_one {}", R::TABLE),
            self.config.request_timeout,
            self.backend.query.select_one(R::TABLE, R::COLUMNS, id),
        )
        .await?;

        match row {
            Some(row) => Ok(Resolution::Upsert(serde_json::from_value(row)?)),
            None => Ok(Resolution::Remove {
                id: id.to_string(),
                parent_id: parent_id.map(str::to_string),
            }),
        }
    }

    fn patch_cached(&self, id: &str, fields: Map<String, Value>) -> SyncResult<Resolution<R>> {
        let Some(cached) = self.get(id) else {
            log::debug!("partial {} payload for uncached {id} skipped", R::TABLE);
            return Ok(Resolution::Skip);
        };

        let mut merged = match serde_json::to_value(&cached)? {
            Value::Object(row) => row,
            _ => return Err(SyncError::decode(format!("{} is not an object", R::TABLE))),
        };
        merged.extend(fields);
        Ok(Resolution::Upsert(serde_json::from_value(Value::Object(merged))?))
    }

    // 命中的分区按 id 替换/插入，原先持有但不再命中的分区移除
    fn merge(&self, record: R) {
        for mut partition in self.partitions.iter_mut() {
            if partition.filter().matches(&record) {
                partition.upsert(record.clone());
            } else {
                partition.remove(record.id());
            }
        }
    }

    fn remove(&self, id: &str, parent: Option<&str>) {
        for mut partition in self.partitions.iter_mut() {
            if in_scope(partition.filter(), parent) {
                partition.remove(id);
            }
        }
    }
}

fn in_scope(filter: &Filter, parent: Option<&str>) -> bool {
    match (filter.parent_id(), parent) {
        (Some(scoped), Some(parent)) => scoped == parent,
        _ => true,
    }
}

fn decode_rows<R: Record>(rows: Vec<Value>) -> SyncResult<OrderedUniqueList<R>> {
    let records = rows
        .into_iter()
        .map(serde_json::from_value::<R>)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OrderedUniqueList::from_unsorted(records))
}
