//! 变更事件（ChangeEvent）
//!
//! 传输层推送的原始消息为 `{operation, new, old}` 形式（`RawChange`），
//! 在订阅适配器边界解码为带标签的 `ChangeEvent<R>` 后才会进入集合存储：
//! - `Insert` / `Update` 携带完整实体或仅含部分列的载荷；
//! - `Delete` 只携带 id（以及已知时的父级 id）。
//!
use crate::error::{SyncError, SyncResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// 传输层推送的原始变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: String,
    pub operation: Operation,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// 订阅通道上的消息
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(RawChange),
    /// 传输层断线后重连成功，期间的事件可能已丢失
    Reconnected,
}

/// 插入/更新载荷
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<R> {
    /// 可完整解码为实体（内嵌数据仍可能缺失，见 `Record::is_hydrated`）
    Complete(R),
    /// 仅含部分列
    Partial {
        id: String,
        parent_id: Option<String>,
        fields: Map<String, Value>,
    },
}

impl<R: Record> Payload<R> {
    pub fn id(&self) -> &str {
        match self {
            Payload::Complete(r) => r.id(),
            Payload::Partial { id, .. } => id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Payload::Complete(r) => r.parent_id(),
            Payload::Partial { parent_id, .. } => parent_id.as_deref(),
        }
    }
}

/// 已校验的变更事件
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R> {
    Insert(Payload<R>),
    Update(Payload<R>),
    Delete {
        id: String,
        parent_id: Option<String>,
    },
}

impl<R: Record> ChangeEvent<R> {
    pub fn insert(record: R) -> Self {
        ChangeEvent::Insert(Payload::Complete(record))
    }

    pub fn update(record: R) -> Self {
        ChangeEvent::Update(Payload::Complete(record))
    }

    pub fn delete(id: impl Into<String>) -> Self {
        ChangeEvent::Delete {
            id: id.into(),
            parent_id: None,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            ChangeEvent::Insert(_) => Operation::Insert,
            ChangeEvent::Update(_) => Operation::Update,
            ChangeEvent::Delete { .. } => Operation::Delete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(p) | ChangeEvent::Update(p) => p.id(),
            ChangeEvent::Delete { id, .. } => id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            ChangeEvent::Insert(p) | ChangeEvent::Update(p) => p.parent_id(),
            ChangeEvent::Delete { parent_id, .. } => parent_id.as_deref(),
        }
    }

    /// 在边界处校验并解码原始变更
    pub fn decode(raw: RawChange) -> SyncResult<Self> {
        if raw.table != R::TABLE {
            return Err(SyncError::decode(format!(
                "change for table `{}` delivered to `{}`",
                raw.table,
                R::TABLE
            )));
        }

        match raw.operation {
            Operation::Insert | Operation::Update => {
                let row = into_row(raw.new, raw.operation)?;
                let id = row_id(&row)?;
                let parent_id = row_parent::<R>(&row);
                let payload = match serde_json::from_value::<R>(Value::Object(row.clone())) {
                    Ok(record) => Payload::Complete(record),
                    Err(_) => Payload::Partial {
                        id,
                        parent_id,
                        fields: row,
                    },
                };
                Ok(match raw.operation {
                    Operation::Insert => ChangeEvent::Insert(payload),
                    _ => ChangeEvent::Update(payload),
                })
            }
            Operation::Delete => {
                let row = into_row(raw.old.or(raw.new), Operation::Delete)?;
                Ok(ChangeEvent::Delete {
                    id: row_id(&row)?,
                    parent_id: row_parent::<R>(&row),
                })
            }
        }
    }
}

fn into_row(value: Option<Value>, op: Operation) -> SyncResult<Map<String, Value>> {
    match value {
        Some(Value::Object(row)) => Ok(row),
        Some(other) => Err(SyncError::decode(format!(
            "{op} payload is not an object: {other}"
        ))),
        None => Err(SyncError::decode(format!("{op} without row payload"))),
    }
}

fn row_id(row: &Map<String, Value>) -> SyncResult<String> {
    match row.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SyncError::decode("row without usable `id`")),
    }
}

fn row_parent<R: Record>(row: &Map<String, Value>) -> Option<String> {
    let column = R::PARENT_COLUMN?;
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Comment, Like};
    use serde_json::json;

    fn like_row(id: &str) -> Value {
        json!({
            "id": id,
            "post_id": "p-1",
            "user_id": "u-1",
            "created_at": "2025-01-01T10:00:00Z",
        })
    }

    #[test]
    fn decodes_complete_insert() {
        let raw = RawChange {
            table: "likes".into(),
            operation: Operation::Insert,
            new: Some(like_row("l-1")),
            old: None,
        };
        let ev = ChangeEvent::<Like>::decode(raw).unwrap();
        assert_eq!(ev.operation(), Operation::Insert);
        assert_eq!(ev.id(), "l-1");
        assert_eq!(ev.parent_id(), Some("p-1"));
        assert!(matches!(ev, ChangeEvent::Insert(Payload::Complete(_))));
    }

    #[test]
    fn partial_update_keeps_id_and_parent() {
        let raw = RawChange {
            table: "comments".into(),
            operation: Operation::Update,
            new: Some(json!({"id": "c-1", "post_id": "p-9", "body": "edited"})),
            old: None,
        };
        match ChangeEvent::<Comment>::decode(raw).unwrap() {
            ChangeEvent::Update(Payload::Partial {
                id,
                parent_id,
                fields,
            }) => {
                assert_eq!(id, "c-1");
                assert_eq!(parent_id.as_deref(), Some("p-9"));
                assert_eq!(fields.get("body"), Some(&json!("edited")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_reads_old_row() {
        let raw = RawChange {
            table: "likes".into(),
            operation: Operation::Delete,
            new: None,
            old: Some(json!({"id": "l-7", "post_id": "p-2"})),
        };
        let ev = ChangeEvent::<Like>::decode(raw).unwrap();
        assert_eq!(
            ev,
            ChangeEvent::Delete {
                id: "l-7".into(),
                parent_id: Some("p-2".into())
            }
        );
    }

    #[test]
    fn rejects_malformed_messages() {
        let wrong_table = RawChange {
            table: "comments".into(),
            operation: Operation::Insert,
            new: Some(like_row("l-1")),
            old: None,
        };
        assert!(matches!(
            ChangeEvent::<Like>::decode(wrong_table),
            Err(SyncError::Decode { .. })
        ));

        let no_id = RawChange {
            table: "likes".into(),
            operation: Operation::Update,
            new: Some(json!({"post_id": "p-1"})),
            old: None,
        };
        assert!(ChangeEvent::<Like>::decode(no_id).is_err());

        let no_row = RawChange {
            table: "likes".into(),
            operation: Operation::Delete,
            new: None,
            old: None,
        };
        assert!(ChangeEvent::<Like>::decode(no_row).is_err());
    }

    #[test]
    fn raw_change_wire_shape() {
        let raw: RawChange = serde_json::from_value(json!({
            "table": "likes",
            "operation": "DELETE",
            "old": {"id": "l-1"}
        }))
        .unwrap();
        assert_eq!(raw.operation, Operation::Delete);
        assert!(raw.new.is_none());
    }
}
