//! 过滤条件（Filter）
//!
//! 一个 `Filter` 同时是快照查询条件与集合分区键：
//! 父级 id（按 `Record::PARENT_COLUMN` 匹配）加若干列条件。
//! 变更事件只会进入过滤条件命中的分区。
//!
use crate::record::Record;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// 单列条件
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Condition {
    Eq(String),
    Gte(String),
    Lte(String),
}

impl Condition {
    fn matches(&self, actual: &Value) -> bool {
        let Some(actual) = render(actual) else {
            return false;
        };
        match self {
            Condition::Eq(expected) => actual == *expected,
            Condition::Gte(bound) => compare(&actual, bound) != Ordering::Less,
            Condition::Lte(bound) => compare(&actual, bound) != Ordering::Greater,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq(v) => write!(f, "eq.{v}"),
            Condition::Gte(v) => write!(f, "gte.{v}"),
            Condition::Lte(v) => write!(f, "lte.{v}"),
        }
    }
}

/// 快照查询条件 / 分区键
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    parent: Option<String>,
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    /// 不做任何限定的全量分区
    pub fn all() -> Self {
        Self::default()
    }

    /// 按父级划分的分区
    pub fn parent(parent_id: impl Into<String>) -> Self {
        Self {
            parent: Some(parent_id.into()),
            conditions: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(column.into(), condition);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(column, Condition::Eq(value.into()))
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn conditions(&self) -> &BTreeMap<String, Condition> {
        &self.conditions
    }

    pub fn is_all(&self) -> bool {
        self.parent.is_none() && self.conditions.is_empty()
    }

    /// 记录是否落在该分区内
    pub fn matches<R: Record>(&self, record: &R) -> bool {
        if let Some(parent) = &self.parent {
            if record.parent_id() != Some(parent.as_str()) {
                return false;
            }
        }
        if self.conditions.is_empty() {
            return true;
        }

        let Ok(Value::Object(row)) = serde_json::to_value(record) else {
            return false;
        };
        self.conditions_match(&row)
    }

    /// 对未解码的行进行匹配（供后端实现使用）
    pub fn matches_row(&self, parent_column: Option<&str>, row: &Map<String, Value>) -> bool {
        if let Some(parent) = &self.parent {
            let actual = parent_column.and_then(|c| row.get(c)).and_then(render);
            if actual.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        self.conditions_match(row)
    }

    fn conditions_match(&self, row: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(column, cond)| row.get(column).is_some_and(|v| cond.matches(v)))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return write!(f, "*");
        }
        let mut parts = Vec::with_capacity(self.conditions.len() + 1);
        if let Some(parent) = &self.parent {
            parts.push(format!("parent={parent}"));
        }
        for (column, cond) in &self.conditions {
            parts.push(format!("{column}={cond}"));
        }
        write!(f, "{}", parts.join(","))
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// 数值 > RFC3339 时间 > 字典序
fn compare(left: &str, right: &str) -> Ordering {
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    if let (Ok(l), Ok(r)) = (
        DateTime::parse_from_rfc3339(left),
        DateTime::parse_from_rfc3339(right),
    ) {
        return l.cmp(&r);
    }
    left.cmp(right)
}
