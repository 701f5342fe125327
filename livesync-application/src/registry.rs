//! 组合根（StoreRegistry）
//!
//! 为每种实体类型构造且仅构造一个 `CollectionStore`，并以引用形式交给使用方，
//! 取代全局单例。同一注册表内的所有存储共享同一个 `Backend`。
//!
use livesync_domain::backend::Backend;
use livesync_domain::collection::CollectionStore;
use livesync_domain::config::SyncConfig;
use livesync_domain::error::SyncResult;
use livesync_domain::feed::{ChangeFeedAdapter, Subscription};
use livesync_domain::filter::Filter;
use livesync_domain::mutation::MutationFacade;
use livesync_domain::record::Record;
use livesync_domain::schema::{
    Comment, Event, JoinRequest, Like, MediaPost, NewsArticle, Registration, Team, TeamMember,
};
use std::collections::HashMap;
use std::sync::Arc;

/// 可从注册表取得存储的实体类型
pub trait Registered: Record {
    fn store_in(registry: &StoreRegistry) -> &Arc<CollectionStore<Self>>;
}

macro_rules! stores {
    ($($field:ident: $ty:ty),* $(,)?) => {
        pub struct StoreRegistry {
            backend: Backend,
            $($field: Arc<CollectionStore<$ty>>,)*
        }

        impl StoreRegistry {
            /// 以统一配置构造；`overrides` 按表名覆盖个别存储的配置
            pub fn with_overrides<I>(backend: Backend, config: SyncConfig, overrides: I) -> Self
            where
                I: IntoIterator<Item = (&'static str, SyncConfig)>,
            {
                let overrides: HashMap<&'static str, SyncConfig> = overrides.into_iter().collect();
                let config_for = |table: &str| overrides.get(table).copied().unwrap_or(config);
                Self {
                    $($field: Arc::new(CollectionStore::new(
                        backend.clone(),
                        config_for(<$ty as Record>::TABLE),
                    )),)*
                    backend,
                }
            }

            /// 已构造的全部表名
            pub fn tables(&self) -> Vec<&'static str> {
                vec![$(<$ty as Record>::TABLE),*]
            }

            $(
                pub fn $field(&self) -> &Arc<CollectionStore<$ty>> {
                    &self.$field
                }
            )*
        }

        $(
            impl Registered for $ty {
                fn store_in(registry: &StoreRegistry) -> &Arc<CollectionStore<Self>> {
                    &registry.$field
                }
            }
        )*
    };
}

stores! {
    events: Event,
    registrations: Registration,
    teams: Team,
    team_members: TeamMember,
    join_requests: JoinRequest,
    news: NewsArticle,
    comments: Comment,
    likes: Like,
    media_posts: MediaPost,
}

impl StoreRegistry {
    pub fn new(backend: Backend, config: SyncConfig) -> Self {
        Self::with_overrides(backend, config, [])
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn store<R: Registered>(&self) -> &Arc<CollectionStore<R>> {
        R::store_in(self)
    }

    pub fn facade<R: Registered>(&self) -> MutationFacade<R> {
        MutationFacade::new(self.store::<R>().clone())
    }

    pub fn adapter<R: Registered>(&self) -> ChangeFeedAdapter<R> {
        ChangeFeedAdapter::new(self.store::<R>().clone())
    }

    /// 订阅某一分区，首次订阅时拉取快照
    pub async fn subscribe<R: Registered>(&self, filter: Filter) -> SyncResult<Subscription> {
        self.adapter::<R>().subscribe(filter).await
    }
}
