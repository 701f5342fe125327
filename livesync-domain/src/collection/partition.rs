use super::OrderedUniqueList;
use crate::error::{SyncError, SyncResult};
use crate::filter::Filter;
use crate::record::Record;
use tokio::sync::watch;

/// 分区加载阶段
///
/// `Uninitialized → Loading → Ready | Errored`，任意阶段均可再次进入 `Loading`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Errored,
}

/// 视图读取的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<R> {
    pub items: OrderedUniqueList<R>,
    pub phase: LoadPhase,
    pub error: Option<SyncError>,
    /// 每次可见状态变化递增
    pub revision: u64,
}

impl<R> Default for CollectionSnapshot<R> {
    fn default() -> Self {
        Self {
            items: OrderedUniqueList::default(),
            phase: LoadPhase::default(),
            error: None,
            revision: 0,
        }
    }
}

impl<R> CollectionSnapshot<R> {
    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    pub fn is_ready(&self) -> bool {
        self.phase == LoadPhase::Ready
    }
}

pub(crate) struct Partition<R> {
    filter: Filter,
    items: OrderedUniqueList<R>,
    phase: LoadPhase,
    error: Option<SyncError>,
    generation: u64,
    revision: u64,
    tx: watch::Sender<CollectionSnapshot<R>>,
}

impl<R: Record> Partition<R> {
    pub(crate) fn new(filter: Filter) -> Self {
        let (tx, _) = watch::channel(CollectionSnapshot::default());
        Self {
            filter,
            items: OrderedUniqueList::new(),
            phase: LoadPhase::Uninitialized,
            error: None,
            generation: 0,
            revision: 0,
            tx,
        }
    }

    pub(crate) fn filter(&self) -> &Filter {
        &self.filter
    }

    pub(crate) fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub(crate) fn items(&self) -> &OrderedUniqueList<R> {
        &self.items
    }

    pub(crate) fn snapshot(&self) -> CollectionSnapshot<R> {
        CollectionSnapshot {
            items: self.items.clone(),
            phase: self.phase,
            error: self.error.clone(),
            revision: self.revision,
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<CollectionSnapshot<R>> {
        self.tx.subscribe()
    }

    /// 发起一次快照拉取，返回本次拉取的代号
    pub(crate) fn begin_fetch(&mut self) -> u64 {
        self.generation += 1;
        self.phase = LoadPhase::Loading;
        self.publish();
        self.generation
    }

    /// 仅当代号仍为最新时才采用拉取结果
    pub(crate) fn finish_fetch(
        &mut self,
        issued: u64,
        result: SyncResult<OrderedUniqueList<R>>,
    ) -> SyncResult<()> {
        if issued != self.generation {
            return Err(SyncError::StaleResultDiscarded {
                issued,
                current: self.generation,
            });
        }

        match result {
            Ok(items) => {
                self.items = items;
                self.phase = LoadPhase::Ready;
                self.error = None;
                self.publish();
                Ok(())
            }
            Err(err) => {
                self.phase = LoadPhase::Errored;
                self.error = Some(err.clone());
                self.publish();
                Err(err)
            }
        }
    }

    pub(crate) fn upsert(&mut self, record: R) {
        if self.items.upsert(record) {
            self.publish();
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let removed = self.items.remove(id).is_some();
        if removed {
            self.publish();
        }
        removed
    }

    pub(crate) fn set_error(&mut self, error: SyncError) {
        if error.is_internal() {
            return;
        }
        self.error = Some(error);
        self.publish();
    }

    pub(crate) fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.publish();
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Like;
    use chrono::{TimeZone, Utc};

    fn like(id: &str) -> Like {
        Like {
            id: id.into(),
            post_id: "p-1".into(),
            user_id: "u-1".into(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut p = Partition::<Like>::new(Filter::parent("p-1"));
        let first = p.begin_fetch();
        let second = p.begin_fetch();

        let stale = p.finish_fetch(first, Ok(OrderedUniqueList::from_unsorted([like("old")])));
        assert_eq!(
            stale,
            Err(SyncError::StaleResultDiscarded {
                issued: first,
                current: second
            })
        );
        assert_eq!(p.phase(), LoadPhase::Loading);

        p.finish_fetch(second, Ok(OrderedUniqueList::from_unsorted([like("new")])))
            .unwrap();
        assert_eq!(p.phase(), LoadPhase::Ready);
        assert!(p.items().contains("new"));
        assert!(!p.items().contains("old"));
    }

    #[test]
    fn failed_fetch_keeps_items() {
        let mut p = Partition::<Like>::new(Filter::all());
        let g = p.begin_fetch();
        p.finish_fetch(g, Ok(OrderedUniqueList::from_unsorted([like("a")])))
            .unwrap();

        let g = p.begin_fetch();
        let err = SyncError::remote("boom");
        assert!(p.finish_fetch(g, Err(err.clone())).is_err());

        let snap = p.snapshot();
        assert_eq!(snap.phase, LoadPhase::Errored);
        assert_eq!(snap.error, Some(err));
        assert_eq!(snap.items.len(), 1);
    }

    #[test]
    fn watchers_observe_revisions() {
        let mut p = Partition::<Like>::new(Filter::all());
        let rx = p.subscribe();
        p.upsert(like("a"));
        p.upsert(like("a"));
        let seen = rx.borrow().clone();
        assert_eq!(seen.revision, 1);
        assert_eq!(seen.items.len(), 1);

        p.set_error(SyncError::StaleResultDiscarded {
            issued: 1,
            current: 2,
        });
        assert!(rx.borrow().error.is_none());
    }
}
