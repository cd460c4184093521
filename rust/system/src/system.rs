use super::executor::ComponentExecutor;
use super::scheduler::Scheduler;
use super::types::{Component, ComponentHandle, ComponentSender, ConsumableJoinHandle};
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Clone, Debug)]
/// A system owns the components started within it and the scheduler their
/// timed messages run on. Stopping the system cancels all scheduled tasks;
/// individual components are stopped through their handles.
pub struct System {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    scheduler: Scheduler,
}

impl System {
    #[allow(clippy::new_without_default)]
    pub fn new() -> System {
        System {
            inner: Arc::new(Inner {
                scheduler: Scheduler::new(),
            }),
        }
    }

    pub fn start_component<C>(&self, component: C) -> ComponentHandle<C>
    where
        C: Component + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel(component.queue_size());
        let sender = ComponentSender::new(tx);
        let cancel_token = tokio_util::sync::CancellationToken::new();
        let mut executor = ComponentExecutor::new(
            sender.clone(),
            cancel_token.clone(),
            component,
            self.clone(),
            self.inner.scheduler.clone(),
        );
        let join_handle = tokio::spawn(async move { executor.run(rx).await });
        ComponentHandle::new(
            cancel_token,
            Some(ConsumableJoinHandle::from_task_handle(join_handle)),
            sender,
        )
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub async fn stop(&self) {
        self.inner.scheduler.stop();
    }

    pub async fn join(&self) {
        self.inner.scheduler.join().await;
    }
}
