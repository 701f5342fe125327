//! 用例命令及其处理器
//!
mod events;
mod news;
mod teams;

pub use events::{CancelRegistration, EventHandlers, RegisterForEvent};
pub use news::{NewsHandlers, PostComment, ToggleLike};
pub use teams::{RequestToJoinTeam, ReviewJoinRequest, TeamHandlers};

use crate::error::AppError;
use crate::inmemory_command_bus::InMemoryCommandBus;
use crate::registry::StoreRegistry;
use livesync_domain::collection::{CollectionSnapshot, CollectionStore, LoadPhase};
use livesync_domain::error::SyncError;
use livesync_domain::filter::Filter;
use livesync_domain::record::Record;
use std::sync::Arc;

/// 注册全部用例处理器
pub fn register_all(bus: &InMemoryCommandBus, registry: Arc<StoreRegistry>) -> Result<(), AppError> {
    let events = Arc::new(EventHandlers::new(registry.clone()));
    bus.register::<RegisterForEvent, _>(events.clone())?;
    bus.register::<CancelRegistration, _>(events)?;

    let teams = Arc::new(TeamHandlers::new(registry.clone()));
    bus.register::<RequestToJoinTeam, _>(teams.clone())?;
    bus.register::<ReviewJoinRequest, _>(teams)?;

    let news = Arc::new(NewsHandlers::new(registry));
    bus.register::<PostComment, _>(news.clone())?;
    bus.register::<ToggleLike, _>(news)?;
    Ok(())
}

/// 分区尚未加载（或上次失败）时先拉取快照；正在加载时等待其完成，再返回当前状态
async fn loaded<R: Record>(
    store: &CollectionStore<R>,
    filter: &Filter,
) -> Result<CollectionSnapshot<R>, AppError> {
    match store.phase(filter) {
        LoadPhase::Uninitialized | LoadPhase::Errored => match store.fetch_snapshot(filter).await {
            Ok(()) | Err(SyncError::StaleResultDiscarded { .. }) => {}
            Err(err) => return Err(err.into()),
        },
        LoadPhase::Loading => {
            let mut rx = store.watch(filter);
            let settled = match rx.wait_for(|snapshot| !snapshot.is_loading()).await {
                Ok(snapshot) => snapshot.clone(),
                Err(_) => store.snapshot(filter),
            };
            if let (LoadPhase::Errored, Some(err)) = (settled.phase, settled.error) {
                return Err(err.into());
            }
        }
        LoadPhase::Ready => {}
    }
    Ok(store.snapshot(filter))
}

fn non_blank<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed)
}
