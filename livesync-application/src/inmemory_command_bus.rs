use crate::{
    command::Command, command_bus::CommandBus, command_handler::CommandHandler,
    context::AppContext, error::AppError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxAnySend = Box<dyn Any + Send>;

type CmdHandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<BoxAnySend, AppError>> + Send + 'a>>;

type CmdHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a AppContext) -> CmdHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 CommandBus 实现
/// - 通过 TypeId 注册不同 Command 对应的 Handler
/// - 以类型擦除方式调度，并在调用端还原 `Command::Output`
pub struct InMemoryCommandBus {
    handlers: DashMap<TypeId, (&'static str, CmdHandlerFn)>,
}

impl Default for InMemoryCommandBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryCommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令处理器；同一命令只能注册一次
    pub fn register<C, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let f: CmdHandlerFn = Arc::new(move |boxed_cmd, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                match boxed_cmd.downcast::<C>() {
                    Ok(cmd) => {
                        let out = handler.handle(ctx, *cmd).await?;
                        Ok(Box::new(out) as BoxAnySend)
                    }
                    Err(_) => Err(AppError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    }),
                }
            })
        });

        match self.handlers.entry(TypeId::of::<C>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegistered { command: C::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((C::NAME, f));
                Ok(())
            }
        }
    }

    /// 已注册的命令名列表
    pub fn registered_commands(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn dispatch<C: Command>(&self, ctx: &AppContext, cmd: C) -> Result<C::Output, AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<C>()).map(|h| h.1.clone()) else {
            return Err(AppError::HandlerNotFound(C::NAME));
        };

        log::debug!("dispatch {}", C::NAME);
        let out = (f)(Box::new(cmd), ctx).await?;

        match out.downcast::<C::Output>() {
            Ok(out) => Ok(*out),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<C::Output>(),
                found: "unknown",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinSet;

    #[derive(Debug)]
    struct Bump;

    impl Command for Bump {
        const NAME: &'static str = "Bump";
        type Output = usize;
    }

    struct BumpHandler {
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandHandler<Bump> for BumpHandler {
        async fn handle(&self, _ctx: &AppContext, _cmd: Bump) -> Result<usize, AppError> {
            Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn register_and_dispatch_works() {
        let bus = InMemoryCommandBus::new();
        bus.register::<Bump, _>(Arc::new(BumpHandler {
            counter: Arc::new(AtomicUsize::new(0)),
        }))
        .unwrap();

        let n = bus.dispatch(&AppContext::default(), Bump).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(bus.registered_commands(), ["Bump"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let bus = InMemoryCommandBus::new();
        let handler = Arc::new(BumpHandler {
            counter: Arc::new(AtomicUsize::new(0)),
        });
        bus.register::<Bump, _>(handler.clone()).unwrap();
        let err = bus.register::<Bump, _>(handler).unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegistered { command: "Bump" }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_admits_one() {
        let bus = Arc::new(InMemoryCommandBus::new());
        let handler = Arc::new(BumpHandler {
            counter: Arc::new(AtomicUsize::new(0)),
        });

        let mut set = JoinSet::new();
        for _ in 0..16 {
            let (bus, handler) = (bus.clone(), handler.clone());
            set.spawn(async move { bus.register::<Bump, _>(handler).is_ok() });
        }
        let mut admitted = 0;
        while let Some(res) = set.join_next().await {
            admitted += usize::from(res.unwrap());
        }
        assert_eq!(admitted, 1);
        assert_eq!(bus.registered_commands(), ["Bump"]);
    }

    #[tokio::test]
    async fn not_found_error_when_unregistered() {
        let bus = InMemoryCommandBus::new();
        let err = bus.dispatch(&AppContext::default(), Bump).await.unwrap_err();
        assert!(matches!(err, AppError::HandlerNotFound("Bump")));
    }

    #[tokio::test]
    async fn type_mismatch_error_when_output_downcast_fails() {
        let bus = InMemoryCommandBus::new();
        // 键是 Bump，但闭包返回 String 而非 usize
        let f: CmdHandlerFn = Arc::new(|_cmd, _ctx| {
            Box::pin(async move { Ok(Box::new("wrong".to_string()) as BoxAnySend) })
        });
        bus.handlers.insert(TypeId::of::<Bump>(), ("Bump", f));

        let err = bus.dispatch(&AppContext::default(), Bump).await.unwrap_err();
        match err {
            AppError::TypeMismatch { expected, .. } => assert_eq!(expected, "usize"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_is_safe() {
        let bus = Arc::new(InMemoryCommandBus::new());
        bus.register::<Bump, _>(Arc::new(BumpHandler {
            counter: Arc::new(AtomicUsize::new(0)),
        }))
        .unwrap();

        let mut set = JoinSet::new();
        for _ in 0..50 {
            let bus = bus.clone();
            set.spawn(async move { bus.dispatch(&AppContext::default(), Bump).await.unwrap() });
        }
        let mut results = Vec::new();
        while let Some(res) = set.join_next().await {
            results.push(res.unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, (1..=50).collect::<Vec<_>>());
    }
}
