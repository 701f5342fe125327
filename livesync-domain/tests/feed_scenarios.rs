mod common;

use common::{GatedQuery, UnfilteredFeed, event_row, eventually, ids, member_row, memory_store, wait_for};
use livesync_domain::backend::{Backend, MemoryBackend, MutationSink};
use livesync_domain::change::{Operation, RawChange};
use livesync_domain::collection::{CollectionStore, LoadPhase};
use livesync_domain::config::SyncConfig;
use livesync_domain::error::{RemoteError, SyncError};
use livesync_domain::feed::ChangeFeedAdapter;
use livesync_domain::filter::Filter;
use livesync_domain::mutation::MutationFacade;
use livesync_domain::schema::{Event, TeamMember};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fast_reconnect() -> SyncConfig {
    SyncConfig::builder()
        .reconnect_interval(Duration::from_millis(10))
        .build()
}

#[tokio::test]
async fn event_timeline_follows_snapshot_and_changes() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.seed("events", [event_row("a", "10:00"), event_row("b", "09:00")])?;
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let all = Filter::all();
    let mut rx = events.watch(&all);

    let _sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;

    // 1. 快照按开始时间升序
    let snap = wait_for(&mut rx, |s| s.is_ready()).await;
    assert_eq!(ids(&snap), ["b", "a"]);

    // 2. 插入
    memory.insert("events", event_row("c", "08:30")).await?;
    let snap = wait_for(&mut rx, |s| s.items.len() == 3).await;
    assert_eq!(ids(&snap), ["c", "b", "a"]);

    // 3. 更新后重新排序
    memory
        .update("events", "b", json!({"starts_at": "2025-05-01T11:00:00Z"}))
        .await?;
    let snap = wait_for(&mut rx, |s| ids(s) != ["c", "b", "a"]).await;
    assert_eq!(ids(&snap), ["c", "a", "b"]);

    // 4. 删除
    memory.delete("events", "a").await?;
    let snap = wait_for(&mut rx, |s| s.items.len() == 2).await;
    assert_eq!(ids(&snap), ["c", "b"]);
    Ok(())
}

#[tokio::test]
async fn team_partitions_receive_only_their_own_members() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.register_record::<TeamMember>();
    // 传输层不做过滤时，由适配器在边界丢弃跨父级事件
    let backend = Backend::new(
        Arc::new(memory.clone()),
        Arc::new(UnfilteredFeed(memory.clone())),
        Arc::new(memory.clone()),
    );
    let members = common::store::<TeamMember>(backend, SyncConfig::default());
    let adapter = ChangeFeedAdapter::new(members.clone());
    let (team1, team2) = (Filter::parent("team1"), Filter::parent("team2"));
    let mut rx1 = members.watch(&team1);
    let mut rx2 = members.watch(&team2);

    let _s1 = adapter.subscribe(team1.clone()).await?;
    let _s2 = adapter.subscribe(team2.clone()).await?;
    wait_for(&mut rx1, |s| s.is_ready()).await;
    wait_for(&mut rx2, |s| s.is_ready()).await;

    memory.insert("team_members", member_row("m1", "team1", 1)).await?;
    memory.insert("team_members", member_row("m2", "team2", 2)).await?;

    let one = wait_for(&mut rx1, |s| s.items.len() == 1).await;
    let two = wait_for(&mut rx2, |s| s.items.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cross = members
        .snapshot(&team1)
        .items
        .iter()
        .filter(|m| m.team_id != "team1")
        .count()
        + members
            .snapshot(&team2)
            .items
            .iter()
            .filter(|m| m.team_id != "team2")
            .count();
    assert_eq!(cross, 0);
    assert_eq!(ids(&one), ["m1"]);
    assert_eq!(ids(&two), ["m2"]);
    Ok(())
}

#[tokio::test]
async fn invalid_create_never_reaches_the_network() {
    let memory = MemoryBackend::default();
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let facade = MutationFacade::new(events);

    let err = facade
        .create(json!({"starts_at": "2025-05-01T10:00:00Z", "created_by": "u-1"}))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Validation { entity: "events", .. }));
    assert_eq!(memory.calls("insert"), 0);
}

#[tokio::test]
async fn subscribe_fetches_only_from_uninitialized() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.seed("events", [event_row("a", "10:00")])?;
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let adapter = ChangeFeedAdapter::new(events.clone());
    let all = Filter::all();

    events.fetch_snapshot(&all).await?;
    assert_eq!(memory.calls("select"), 1);

    let _s1 = adapter.subscribe(all.clone()).await?;
    let _s2 = adapter.subscribe(all.clone()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(memory.calls("select"), 1);

    let team = Filter::all().eq("status", "live");
    let _s3 = adapter.subscribe(team.clone()).await?;
    eventually(|| events.phase(&team) == LoadPhase::Ready).await;
    assert_eq!(memory.calls("select"), 2);
    Ok(())
}

#[tokio::test]
async fn reconnected_signal_triggers_a_fresh_snapshot() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.seed("events", [event_row("a", "10:00")])?;
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let _sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    // 断线期间遗漏的写入
    memory.seed("events", [event_row("missed", "08:00")])?;
    memory.signal_reconnect("events");

    let snap = wait_for(&mut rx, |s| s.items.len() == 2).await;
    assert_eq!(ids(&snap), ["missed", "a"]);
    assert_eq!(memory.calls("select"), 2);
    Ok(())
}

#[tokio::test]
async fn dropped_channel_keeps_items_and_recovers() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.seed("events", [event_row("a", "10:00")])?;
    let events = memory_store::<Event>(&memory, fast_reconnect());
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    memory.fail_next("open_channel", RemoteError::backend("realtime unavailable", None));
    memory.drop_channels("events");
    let snap = wait_for(&mut rx, |s| s.error.is_some()).await;
    assert!(matches!(snap.error, Some(SyncError::Subscription { .. })));
    assert_eq!(ids(&snap), ["a"]);

    memory.seed("events", [event_row("b", "11:00")])?;
    let snap = wait_for(&mut rx, |s| s.items.len() == 2 && s.is_ready()).await;
    assert_eq!(ids(&snap), ["a", "b"]);
    assert!(snap.error.is_none());
    assert_eq!(memory.calls("open_channel"), 3);
    assert_eq!(memory.open_channels("events"), 1);
    assert!(sub.is_active());

    sub.join().await;
    assert_eq!(memory.open_channels("events"), 0);
    Ok(())
}

#[tokio::test]
async fn reconnection_gives_up_after_max_attempts() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    let config = SyncConfig::builder()
        .reconnect_interval(Duration::from_millis(10))
        .max_reconnect_attempts(1)
        .build();
    let events = memory_store::<Event>(&memory, config);
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    memory.fail_next("open_channel", RemoteError::backend("realtime unavailable", None));
    memory.drop_channels("events");

    eventually(|| !sub.is_active()).await;
    let snap = events.snapshot(&all);
    match snap.error {
        Some(SyncError::Subscription { reason, .. }) => assert!(reason.contains("gave up")),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn failed_subscribe_records_subscription_error() {
    let memory = MemoryBackend::default();
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    memory.fail_next("open_channel", RemoteError::backend("realtime unavailable", None));

    let result = ChangeFeedAdapter::new(events.clone())
        .subscribe(Filter::all())
        .await;
    assert!(matches!(result, Err(SyncError::Subscription { .. })));
    assert!(matches!(
        events.snapshot(&Filter::all()).error,
        Some(SyncError::Subscription { .. })
    ));
    assert_eq!(events.phase(&Filter::all()), LoadPhase::Uninitialized);
}

#[tokio::test]
async fn malformed_changes_are_skipped() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let _sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    memory.emit(RawChange {
        table: "events".into(),
        operation: Operation::Insert,
        new: Some(json!("not a row")),
        old: None,
    });
    memory.insert("events", event_row("ok", "10:00")).await?;

    let snap = wait_for(&mut rx, |s| !s.items.is_empty()).await;
    assert_eq!(ids(&snap), ["ok"]);
    assert!(snap.error.is_none());
    Ok(())
}

#[tokio::test]
async fn cancelled_subscription_ignores_late_rehydration() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    let gated = Arc::new(GatedQuery::new(memory.clone()));
    let backend = Backend::new(gated.clone(), Arc::new(memory.clone()), Arc::new(memory.clone()));
    let events = Arc::new(CollectionStore::<Event>::new(backend, SyncConfig::default()));
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    let late = gated.gate_select_one();
    memory.insert("events", event_row("late", "10:00")).await?;
    eventually(|| gated.select_one_started() == 1).await;

    sub.cancel();
    sub.cancel();
    assert!(!sub.is_active());
    let _ = late.send(Ok(Some(event_row("late", "10:00"))));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(events.get("late").is_none());
    sub.join().await;
    assert_eq!(memory.open_channels("events"), 0);
    Ok(())
}

#[tokio::test]
async fn rehydration_failure_is_recorded_and_event_not_applied() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let _sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    memory.fail_next("select_one", RemoteError::backend("JWT expired", Some("PGRST301".into())));
    memory.insert("events", event_row("x", "10:00")).await?;

    let snap = wait_for(&mut rx, |s| s.error.is_some()).await;
    assert!(snap.items.is_empty());
    assert!(matches!(snap.error, Some(SyncError::Remote(r)) if r.message() == "JWT expired"));
    Ok(())
}

#[tokio::test]
async fn rehydrated_rows_carry_embedded_teams() -> anyhow::Result<()> {
    let memory = MemoryBackend::default();
    memory.seed(
        "teams",
        [json!({"id": "t-1", "name": "Harriers", "owner_id": "u-1", "created_at": "2025-01-01T00:00:00Z"})],
    )?;
    let events = memory_store::<Event>(&memory, SyncConfig::default());
    let all = Filter::all();
    let mut rx = events.watch(&all);
    let _sub = ChangeFeedAdapter::new(events.clone()).subscribe(all.clone()).await?;
    wait_for(&mut rx, |s| s.is_ready()).await;

    let mut row = event_row("e", "10:00");
    row["home_team_id"] = json!("t-1");
    memory.insert("events", row).await?;

    let snap = wait_for(&mut rx, |s| !s.items.is_empty()).await;
    let event = &snap.items.as_slice()[0];
    assert_eq!(event.home_team.as_ref().map(|t| t.name.as_str()), Some("Harriers"));
    assert!(event.away_team.is_none());
    Ok(())
}
