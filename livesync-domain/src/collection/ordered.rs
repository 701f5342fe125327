use crate::record::Record;
use std::cmp::Ordering;

/// 按 `(sort_key, id)` 升序排列、id 唯一的实体列表
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedUniqueList<R> {
    items: Vec<R>,
}

impl<R> Default for OrderedUniqueList<R> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<R: Record> OrderedUniqueList<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由任意顺序的实体构造；同 id 时后出现者生效
    pub fn from_unsorted<I>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let mut list = Self::new();
        for record in records {
            list.upsert(record);
        }
        list
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.position(id).map(|i| &self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// 按 id 替换或插入，并保持排序；返回内容是否发生变化
    pub fn upsert(&mut self, record: R) -> bool {
        if let Some(i) = self.position(record.id()) {
            if self.items[i] == record {
                return false;
            }
            self.items.remove(i);
        }

        let key = (record.sort_key(), record.id().to_string());
        let at = self
            .items
            .partition_point(|r| cmp_key(r, &key) == Ordering::Less);
        self.items.insert(at, record);
        true
    }

    /// 移除 id 对应的实体；不存在时不做任何事
    pub fn remove(&mut self, id: &str) -> Option<R> {
        self.position(id).map(|i| self.items.remove(i))
    }

    pub fn into_vec(self) -> Vec<R> {
        self.items
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|r| r.id() == id)
    }
}

fn cmp_key<R: Record>(record: &R, key: &(R::SortKey, String)) -> Ordering {
    record
        .sort_key()
        .cmp(&key.0)
        .then_with(|| record.id().cmp(key.1.as_str()))
}

impl<'a, R> IntoIterator for &'a OrderedUniqueList<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
