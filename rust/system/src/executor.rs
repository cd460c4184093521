use super::{scheduler::Scheduler, system::System, Component, ComponentContext, ComponentSender, WrappedMessage};
use tokio::{select, time::timeout};
use tracing::{Instrument, Span};

/// The executor holds the context for a component's execution and is responsible
/// for running the component's handler methods off its message queue.
pub(super) struct ComponentExecutor<C>
where
    C: Component,
{
    sender: ComponentSender<C>,
    cancellation_token: tokio_util::sync::CancellationToken,
    system: System,
    scheduler: Scheduler,
    handler: C,
}

impl<C> ComponentExecutor<C>
where
    C: Component + Send + 'static,
{
    pub(super) fn new(
        sender: ComponentSender<C>,
        cancellation_token: tokio_util::sync::CancellationToken,
        handler: C,
        system: System,
        scheduler: Scheduler,
    ) -> Self {
        ComponentExecutor {
            sender,
            cancellation_token,
            system,
            scheduler,
            handler,
        }
    }

    fn component_context(&self) -> ComponentContext<C> {
        ComponentContext {
            system: self.system.clone(),
            sender: self.sender.clone(),
            cancellation_token: self.cancellation_token.clone(),
            scheduler: self.scheduler.clone(),
        }
    }

    pub(super) async fn run(
        &mut self,
        mut channel: tokio::sync::mpsc::Receiver<WrappedMessage<C>>,
    ) {
        let ctx = self.component_context();
        self.handler.on_start(&ctx).await;

        loop {
            select! {
                _ = self.cancellation_token.cancelled() => {
                    if let Err(err) = timeout(
                        self.handler.on_stop_timeout(),
                        self.handler.on_stop(),
                    )
                    .await
                    {
                        tracing::error!("Unable to gracefully shutdown {:?}: {err}", self.handler);
                    }
                    break;
                }
                message = channel.recv() => {
                    match message {
                        Some(mut message) => {
                            let span: tracing::Span = message.get_tracing_context().unwrap_or(Span::current().clone());
                            let component_context = self.component_context();
                            let task_future = message.handle(&mut self.handler, &component_context);
                            task_future.instrument(span).await;
                        }
                        None => {
                            tracing::error!("Channel closed");
                        }
                    }
                }
            }
        }
    }
}
