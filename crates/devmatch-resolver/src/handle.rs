//! Public face of a running resolver.

use std::sync::Arc;

use devmatch_kernel::{
    DeviceEvent, DriverEvent, KernelError, KernelResult, LocatorEvent, ModuleLoader, Registry,
    RegistryEvent, RegistryListener, ResolverConfig, ResolverEvent, SelectorEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::mailbox::{Mailbox, WorkerMessage};
use crate::worker::Worker;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for work or the next reaper tick
    Idle,
    /// Resolving pending devices
    Draining,
    /// Shut down
    Stopped,
}

/// Point-in-time view of the worker, taken on the worker task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStatus {
    pub state: WorkerState,
    /// Devices waiting for a resolution pass
    pub pending_devices: usize,
    /// Devices whose last pass found no driver
    pub idle_devices: usize,
    pub drivers: usize,
    pub locators: usize,
    pub selectors: usize,
    pub cache_entries: usize,
    pub leased_modules: usize,
}

/// A resolver ready to be spawned.
///
/// ```rust,ignore
/// let (handle, worker) = DeviceResolver::new(ResolverConfig::default(), loader).spawn();
/// handle.subscribe_to(registry.as_ref());
/// // ...
/// handle.shutdown();
/// worker.await?;
/// ```
pub struct DeviceResolver {
    config: ResolverConfig,
    loader: Arc<dyn ModuleLoader>,
}

impl DeviceResolver {
    pub fn new(config: ResolverConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { config, loader }
    }

    /// Start the worker task on the current tokio runtime.
    pub fn spawn(self) -> (ResolverHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let cancel = CancellationToken::new();

        let reaper_interval = self.config.reaper_interval();
        let engine = Engine::new(self.config, self.loader, events.clone());
        let worker = Worker::new(engine, Mailbox::new(rx), cancel.clone(), reaper_interval);

        info!("Starting device resolver");
        let task = tokio::spawn(worker.run());
        (ResolverHandle::from_parts(tx, events, cancel), task)
    }
}

/// Cloneable handle to a running resolver.
///
/// Every method returns immediately; registry callbacks only enqueue.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    events: broadcast::Sender<ResolverEvent>,
    cancel: CancellationToken,
}

impl ResolverHandle {
    pub(crate) fn from_parts(
        tx: mpsc::UnboundedSender<WorkerMessage>,
        events: broadcast::Sender<ResolverEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { tx, events, cancel }
    }

    /// Queue a registry notification for the worker.
    pub fn notify(&self, event: impl Into<RegistryEvent>) {
        if self.tx.send(WorkerMessage::Registry(event.into())).is_err() {
            debug!("Resolver stopped, dropping registry notification");
        }
    }

    /// Receive every [`ResolverEvent`] published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ResolverEvent> {
        self.events.subscribe()
    }

    /// Register with `registry`, replaying what it already holds.
    pub fn subscribe_to(&self, registry: &dyn Registry) {
        registry.subscribe(Arc::new(self.clone()));
    }

    /// Ask the worker for a status snapshot.
    ///
    /// A query that races with shutdown is answered with
    /// [`WorkerState::Stopped`]; once the worker is gone this fails.
    pub async fn status(&self) -> KernelResult<ResolverStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Status(reply))
            .map_err(|_| KernelError::Internal("Resolver is not running".to_string()))?;
        rx.await
            .map_err(|_| KernelError::Internal("Resolver stopped before replying".to_string()))
    }

    /// Stop the worker. A pass in progress is allowed to finish.
    pub fn shutdown(&self) {
        info!("Stopping device resolver");
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl RegistryListener for ResolverHandle {
    fn on_device_changed(&self, event: DeviceEvent) {
        self.notify(event);
    }

    fn on_driver_changed(&self, event: DriverEvent) {
        self.notify(event);
    }

    fn on_locator_changed(&self, event: LocatorEvent) {
        self.notify(event);
    }

    fn on_selector_changed(&self, event: SelectorEvent) {
        self.notify(event);
    }
}
