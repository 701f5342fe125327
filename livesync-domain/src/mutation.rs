//! 变更门面（MutationFacade）
//!
//! 在调用远端之前完成本地校验：
//! - create：载荷为对象，`Record::REQUIRED` 中的列存在、非空、字符串非空白；
//! - update：id 非空白，补丁为非空对象，不可修改 `id`，补丁中的必填列不可置空；
//! - delete：id 非空白。
//!
//! 校验失败返回 `SyncError::Validation`，不会产生任何网络调用，也不记录到集合状态。
//!
use crate::collection::{CollectionStore, Mutation};
use crate::error::{SyncError, SyncResult};
use crate::record::Record;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct MutationFacade<R: Record> {
    store: Arc<CollectionStore<R>>,
}

impl<R: Record> Clone for MutationFacade<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<R: Record> MutationFacade<R> {
    pub fn new(store: Arc<CollectionStore<R>>) -> Self {
        Self { store }
    }

    pub async fn create(&self, row: Value) -> SyncResult<R> {
        let row = validate_create::<R>(row)?;
        self.store
            .mutate(Mutation::Insert(Value::Object(row)))
            .await?
            .ok_or_else(|| not_returned::<R>("insert"))
    }

    pub async fn update(&self, id: &str, patch: Value) -> SyncResult<R> {
        let id = validate_id::<R>(id)?;
        let patch = validate_patch::<R>(id, patch)?;
        self.store
            .mutate(Mutation::Update {
                id: id.to_string(),
                patch: Value::Object(patch),
            })
            .await?
            .ok_or_else(|| not_returned::<R>("update"))
    }

    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let id = validate_id::<R>(id)?;
        self.store
            .mutate(Mutation::Delete { id: id.to_string() })
            .await?;
        Ok(())
    }

    /// 以任意可序列化的草稿创建
    pub async fn create_from<T: Serialize>(&self, draft: &T) -> SyncResult<R> {
        self.create(to_payload::<R, _>(draft)?).await
    }

    /// 以任意可序列化的补丁更新
    pub async fn update_from<T: Serialize>(&self, id: &str, patch: &T) -> SyncResult<R> {
        self.update(id, to_payload::<R, _>(patch)?).await
    }
}

fn to_payload<R: Record, T: Serialize>(value: &T) -> SyncResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| SyncError::validation(R::TABLE, format!("payload not serializable: {e}")))
}

fn not_returned<R: Record>(op: &str) -> SyncError {
    SyncError::NotFound {
        reason: format!("{op} on {} returned no row", R::TABLE),
    }
}

fn validate_id<R: Record>(id: &str) -> SyncResult<&str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(SyncError::validation(R::TABLE, "id must not be blank"));
    }
    Ok(trimmed)
}

fn validate_create<R: Record>(row: Value) -> SyncResult<Map<String, Value>> {
    let Value::Object(row) = row else {
        return Err(SyncError::validation(R::TABLE, "payload must be an object"));
    };

    for column in R::REQUIRED {
        match row.get(*column) {
            None => {
                return Err(SyncError::validation(
                    R::TABLE,
                    format!("missing required column `{column}`"),
                ));
            }
            Some(value) => check_present::<R>(column, value)?,
        }
    }
    Ok(row)
}

fn validate_patch<R: Record>(id: &str, patch: Value) -> SyncResult<Map<String, Value>> {
    let Value::Object(patch) = patch else {
        return Err(SyncError::validation(R::TABLE, "patch must be an object"));
    };
    if patch.is_empty() {
        return Err(SyncError::validation(R::TABLE, "patch must not be empty"));
    }
    if let Some(new_id) = patch.get("id") {
        if new_id.as_str() != Some(id) {
            return Err(SyncError::validation(R::TABLE, "patch must not change `id`"));
        }
    }

    for column in R::REQUIRED {
        if let Some(value) = patch.get(*column) {
            check_present::<R>(column, value)?;
        }
    }
    Ok(patch)
}

fn check_present<R: Record>(column: &str, value: &Value) -> SyncResult<()> {
    match value {
        Value::Null => Err(SyncError::validation(
            R::TABLE,
            format!("required column `{column}` must not be null"),
        )),
        Value::String(s) if s.trim().is_empty() => Err(SyncError::validation(
            R::TABLE,
            format!("required column `{column}` must not be blank"),
        )),
        _ => Ok(()),
    }
}
