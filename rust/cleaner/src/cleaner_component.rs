use crate::config::TrashcanCleanerConfig;
use crate::lease::LeaseCoordinator;
use crate::protection::ProtectionPolicy;
use crate::pruner::TreePruner;
use crate::scanner::CandidateScanner;
use crate::sweeper::SweepController;
use crate::types::{CleanerState, CleanerStatus, SweepOutcome, SweepSummary};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::span;
use trashcan_config::registry::{Injectable, Registry};
use trashcan_config::Configurable;
use trashcan_error::TrashcanError;
use trashcan_storage::{
    LockService, MemoryLockService, MemoryNodeStore, MemoryTypeDictionary, NodeStore,
    TransactionRunner, TypeDictionary,
};
use trashcan_system::{Component, ComponentContext, Handler};

/// Registry handle for the node store backing the cleaner. Register one
/// before constructing the component to swap the backend; otherwise an
/// in-memory store is created and registered.
#[derive(Clone, Debug)]
pub struct NodeStoreHandle(pub Arc<dyn NodeStore>);

impl Injectable for NodeStoreHandle {}

#[derive(Clone, Debug)]
pub struct TypeDictionaryHandle(pub Arc<dyn TypeDictionary>);

impl Injectable for TypeDictionaryHandle {}

#[derive(Clone, Debug)]
pub struct LockServiceHandle(pub Arc<dyn LockService>);

impl Injectable for LockServiceHandle {}

/// The cleaner component: sweeps on a schedule and serves the control
/// surface (status, enable, disable, execute).
#[derive(Debug)]
pub struct TrashcanCleaner {
    sweep_interval: Duration,
    controller: Arc<SweepController>,
    state: CleanerState,
}

#[derive(Debug, Clone)]
pub struct SweepMessage;

#[derive(Debug)]
pub struct StopRequest;

#[derive(Debug)]
pub struct DisableRequest;

#[derive(Debug)]
pub struct EnableRequest;

#[derive(Debug)]
pub struct StatusRequest;

#[async_trait]
impl Component for TrashcanCleaner {
    fn get_name() -> &'static str {
        "TrashcanCleaner"
    }

    fn queue_size(&self) -> usize {
        100
    }

    async fn on_start(&mut self, ctx: &ComponentContext<Self>) {
        ctx.scheduler.schedule(SweepMessage, self.sweep_interval, ctx, || {
            Some(span!(parent: None, tracing::Level::INFO, "Scheduled trashcan sweep"))
        });
    }

    fn on_stop_timeout(&self) -> Duration {
        // Leave room for an in-flight prune transaction to finish.
        Duration::from_secs(60)
    }
}

#[async_trait]
impl Handler<SweepMessage> for TrashcanCleaner {
    type Result = SweepSummary;

    async fn handle(&mut self, _message: SweepMessage, ctx: &ComponentContext<Self>) -> SweepSummary {
        let summary = match self.controller.execute().await {
            Ok(summary) => summary,
            Err(err) => {
                if err.should_trace_error() {
                    tracing::error!("Sweep failed with {}: {}", err.code().name(), err);
                }
                SweepSummary::no_op(SweepOutcome::Failed)
            }
        };

        // Schedule next run
        ctx.scheduler.schedule(SweepMessage, self.sweep_interval, ctx, || {
            Some(span!(parent: None, tracing::Level::INFO, "Scheduled trashcan sweep"))
        });

        summary
    }
}

#[async_trait]
impl Handler<StopRequest> for TrashcanCleaner {
    type Result = CleanerStatus;

    async fn handle(&mut self, _message: StopRequest, _ctx: &ComponentContext<Self>) -> CleanerStatus {
        self.state.stop()
    }
}

#[async_trait]
impl Handler<DisableRequest> for TrashcanCleaner {
    type Result = CleanerStatus;

    async fn handle(
        &mut self,
        _message: DisableRequest,
        _ctx: &ComponentContext<Self>,
    ) -> CleanerStatus {
        self.state.disable()
    }
}

#[async_trait]
impl Handler<EnableRequest> for TrashcanCleaner {
    type Result = CleanerStatus;

    async fn handle(
        &mut self,
        _message: EnableRequest,
        _ctx: &ComponentContext<Self>,
    ) -> CleanerStatus {
        self.state.enable()
    }
}

#[async_trait]
impl Handler<StatusRequest> for TrashcanCleaner {
    type Result = CleanerStatus;

    async fn handle(
        &mut self,
        _message: StatusRequest,
        _ctx: &ComponentContext<Self>,
    ) -> CleanerStatus {
        self.state.status()
    }
}

#[async_trait]
impl Configurable<TrashcanCleanerConfig> for TrashcanCleaner {
    async fn try_from_config(
        config: &TrashcanCleanerConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn TrashcanError>> {
        let store = match registry.get::<NodeStoreHandle>() {
            Ok(handle) => handle.0,
            Err(_) => {
                let handle = NodeStoreHandle(Arc::new(MemoryNodeStore::new()));
                registry.register(handle.clone());
                handle.0
            }
        };
        let dictionary = match registry.get::<TypeDictionaryHandle>() {
            Ok(handle) => handle.0,
            Err(_) => {
                let handle = TypeDictionaryHandle(Arc::new(MemoryTypeDictionary::new()));
                registry.register(handle.clone());
                handle.0
            }
        };
        let locks = match registry.get::<LockServiceHandle>() {
            Ok(handle) => handle.0,
            Err(_) => {
                let handle = LockServiceHandle(Arc::new(MemoryLockService::new()));
                registry.register(handle.clone());
                handle.0
            }
        };

        let skip_nodes = config.skip_node_refs().map_err(|err| err.boxed())?;
        let protected_types = config.protected_types().map_err(|err| err.boxed())?;
        let transactions = TransactionRunner::new(&config.retry);
        let policy = Arc::new(ProtectionPolicy::new(
            skip_nodes,
            protected_types,
            store.clone(),
            dictionary,
        ));
        let pruner = TreePruner::new(store.clone(), policy, transactions);
        let scanner = CandidateScanner::new(store, transactions);
        let lease = LeaseCoordinator::new(locks, Duration::from_millis(config.lease_ttl_ms));
        let state = CleanerState::new();
        let controller = SweepController::new(
            scanner,
            pruner,
            lease,
            state.clone(),
            config.retention_days,
            config.page_size,
            config.max_batch_size,
            Duration::from_secs(config.max_run_time_secs),
        );

        Ok(TrashcanCleaner {
            sweep_interval: Duration::from_secs(config.sweep_interval_mins * 60),
            controller: Arc::new(controller),
            state,
        })
    }
}
