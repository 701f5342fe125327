use livesync_application::command_bus::CommandBus;
use livesync_application::context::AppContext;
use livesync_application::handlers::{PostComment, RegisterForEvent, ToggleLike, register_all};
use livesync_application::{InMemoryCommandBus, StoreRegistry};
use livesync_domain::backend::{Backend, MemoryBackend, MutationSink};
use livesync_domain::collection::CollectionSnapshot;
use livesync_domain::config::SyncConfig;
use livesync_domain::filter::Filter;
use livesync_domain::record::Record;
use livesync_domain::schema::{Comment, Event, Registration, Team};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn seed(memory: &MemoryBackend) -> anyhow::Result<()> {
    memory.seed(
        "profiles",
        [
            json!({"id": "u-1", "display_name": "Ana"}),
            json!({"id": "u-2", "display_name": "Ben"}),
        ],
    )?;
    memory.seed(
        "teams",
        [
            json!({"id": "t-1", "name": "Harriers", "owner_id": "u-1", "created_at": "2025-01-01T00:00:00Z"}),
            json!({"id": "t-2", "name": "Otters", "owner_id": "u-2", "created_at": "2025-01-02T00:00:00Z"}),
        ],
    )?;
    memory.seed(
        "events",
        [
            json!({
                "id": "e-1", "title": "League opener", "starts_at": "2025-05-01T10:00:00Z",
                "status": "scheduled", "created_by": "u-1",
                "home_team_id": "t-1", "away_team_id": "t-2",
            }),
            json!({
                "id": "e-2", "title": "Open training", "starts_at": "2025-05-01T09:00:00Z",
                "status": "scheduled", "created_by": "u-2",
            }),
        ],
    )?;
    Ok(())
}

fn print_events(snapshot: &CollectionSnapshot<Event>) {
    println!("events (rev {}, {:?}):", snapshot.revision, snapshot.phase);
    for event in snapshot.items.iter() {
        let teams = match (&event.home_team, &event.away_team) {
            (Some(home), Some(away)) => format!(" [{} vs {}]", home.name, away.name),
            _ => String::new(),
        };
        println!("  {} {} {}{teams}", event.starts_at.format("%H:%M"), event.id, event.title);
    }
}

async fn settle<R: Record>(rx: &mut watch::Receiver<CollectionSnapshot<R>>) -> CollectionSnapshot<R> {
    // 等待后台订阅任务处理完已推送的变更
    tokio::time::sleep(Duration::from_millis(50)).await;
    rx.borrow_and_update().clone()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let memory = MemoryBackend::default();
    memory.register_record::<Event>();
    memory.register_record::<Registration>();
    memory.register_record::<Comment>();
    seed(&memory)?;

    let registry = Arc::new(StoreRegistry::new(
        Backend::from_shared(Arc::new(memory.clone())),
        SyncConfig::builder()
            .reconnect_interval(Duration::from_millis(100))
            .build(),
    ));
    let bus = InMemoryCommandBus::new();
    register_all(&bus, registry.clone())?;
    log::info!("registered commands: {:?}", bus.registered_commands());

    // 赛事时间线
    let all = Filter::all();
    let mut events_rx = registry.events().watch(&all);
    let events_sub = registry.subscribe::<Event>(all.clone()).await?;
    print_events(&settle(&mut events_rx).await);

    memory
        .insert(
            "events",
            json!({
                "id": "e-3", "title": "Early run", "starts_at": "2025-05-01T08:30:00Z",
                "status": "scheduled", "created_by": "u-2",
            }),
        )
        .await?;
    memory
        .update("events", "e-2", json!({"starts_at": "2025-05-01T11:00:00Z"}))
        .await?;
    print_events(&settle(&mut events_rx).await);

    // 重命名球队不会刷新赛事中内嵌的球队名，直到赛事被重新拉取
    memory.update("teams", "t-1", json!({"name": "Harriers FC"})).await?;
    memory.signal_reconnect("events");
    print_events(&settle(&mut events_rx).await);

    // 用例命令
    let ana = AppContext::for_user("u-1");
    let registration = bus
        .dispatch(
            &ana,
            RegisterForEvent {
                event_id: "e-1".into(),
            },
        )
        .await?;
    println!("registered {} for {}", registration.user_id, registration.event_id);
    if let Err(err) = bus
        .dispatch(
            &ana,
            RegisterForEvent {
                event_id: "e-1".into(),
            },
        )
        .await
    {
        println!("second registration rejected: {err}");
    }

    let post = Filter::parent("p-1");
    let mut comments_rx = registry.comments().watch(&post);
    let comments_sub = registry.subscribe::<Comment>(post.clone()).await?;
    bus.dispatch(
        &ana,
        PostComment {
            post_id: "p-1".into(),
            body: "What a match!".into(),
        },
    )
    .await?;
    let liked = bus
        .dispatch(
            &ana,
            ToggleLike {
                post_id: "p-1".into(),
            },
        )
        .await?;
    let comments = settle(&mut comments_rx).await;
    for comment in comments.items.iter() {
        let author = comment
            .author
            .as_ref()
            .map(|a| a.display_name.as_str())
            .unwrap_or("?");
        println!("comment by {author}: {} (liked: {liked})", comment.body);
    }

    // 断线后保留旧数据并自动重连
    memory.drop_channels("events");
    let snapshot = settle(&mut events_rx).await;
    println!("after drop: {} items, error: {:?}", snapshot.items.len(), snapshot.error);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let snapshot = events_rx.borrow_and_update().clone();
    println!("after reconnect: {:?}, error: {:?}", snapshot.phase, snapshot.error);

    let teams = registry.teams();
    teams.fetch_snapshot(&all).await?;
    for team in teams.snapshot(&all).items.iter() {
        let summary = Team::summary(team);
        println!("team {} ({})", summary.name, summary.id);
    }

    comments_sub.join().await;
    events_sub.join().await;
    Ok(())
}
