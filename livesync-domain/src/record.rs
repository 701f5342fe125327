//! 记录（Record）基础抽象
//!
//! 每种实体类型（赛事、球队、成员、评论……）以 `Record` 描述：
//! 表名、查询投影、父级外键、插入必填列，以及标识/排序键/父级的提取方式。
//! 通常由 `#[record(...)]` 宏生成实现。
//!
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;

/// 可被集合存储同步的行记录
pub trait Record:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 远端表名
    const TABLE: &'static str;

    /// 查询投影（包含需要内嵌的关联实体）
    const COLUMNS: &'static str = "*";

    /// 父级外键列（如 `team_id`），无父级划分时为 `None`
    const PARENT_COLUMN: Option<&'static str> = None;

    /// 插入时必须提供的列
    const REQUIRED: &'static [&'static str] = &[];

    /// 组成排序键的列，供快照查询下推排序
    const ORDER_BY: &'static [&'static str] = &[];

    /// 排序键；同键时以 id 决定先后
    type SortKey: Ord + Clone + fmt::Debug + Send + Sync;

    /// 稳定标识
    fn id(&self) -> &str;

    fn sort_key(&self) -> Self::SortKey;

    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// 外键所承诺的内嵌实体是否都已就位
    fn is_hydrated(&self) -> bool {
        true
    }
}

/// 外键字段：`String` 总是有值，`Option<String>` 可能为空
pub trait ForeignKey {
    fn key(&self) -> Option<&str>;
}

impl ForeignKey for String {
    fn key(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl ForeignKey for Option<String> {
    fn key(&self) -> Option<&str> {
        self.as_deref()
    }
}

/// 外键有值时，对应的内嵌实体必须存在
pub fn embed_resolved<K, E>(foreign_key: &K, embed: &Option<E>) -> bool
where
    K: ForeignKey + ?Sized,
{
    foreign_key.key().is_none() || embed.is_some()
}
