//! 集合（collection）
//!
//! - `OrderedUniqueList`：id 唯一、按 `(sort_key, id)` 排序的实体列表；
//! - `CollectionSnapshot` / `LoadPhase`：视图读取的分区状态；
//! - `CollectionStore`：按分区维护列表并协调快照、变更事件与远端变更。
//!
mod ordered;
mod partition;
mod store;

pub use ordered::OrderedUniqueList;
pub use partition::{CollectionSnapshot, LoadPhase};
pub use store::{CollectionStore, Mutation, Resolution};
