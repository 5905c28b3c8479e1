//! The single task that serializes all resolution work.

use std::collections::VecDeque;
use std::time::Duration;

use devmatch_kernel::{DeviceEvent, DeviceRef, RegistryEvent, ResolverEvent};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::handle::{ResolverStatus, WorkerState};
use crate::lease::deadline_after;
use crate::mailbox::{Mailbox, WorkerMessage};

/// Why an idle worker woke up.
enum Wake {
    Shutdown,
    Message(WorkerMessage),
    Disconnected,
    Tick,
}

pub struct Worker {
    engine: Engine,
    mailbox: Mailbox,
    cancel: CancellationToken,
    reaper_interval: Duration,
    next_reap: Instant,
    /// Devices waiting for a pass, in arrival order, without duplicates
    pending: VecDeque<DeviceRef>,
    /// Devices whose last pass found no driver
    idle: Vec<DeviceRef>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        engine: Engine,
        mailbox: Mailbox,
        cancel: CancellationToken,
        reaper_interval: Duration,
    ) -> Self {
        Self {
            engine,
            mailbox,
            cancel,
            reaper_interval,
            next_reap: deadline_after(Instant::now(), reaper_interval),
            pending: VecDeque::new(),
            idle: Vec::new(),
            state: WorkerState::Idle,
        }
    }

    pub async fn run(mut self) {
        debug!("Resolver worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            while let Some(message) = self.mailbox.try_next() {
                self.handle(message);
            }
            if self.engine.take_landscape_changed() {
                self.requeue_idle();
            }

            if let Some(device) = self.pending.pop_front() {
                self.state = WorkerState::Draining;
                if self.engine.resolve(&device, &mut self.mailbox).await {
                    self.idle.retain(|d| d != &device);
                } else if !self.idle.contains(&device) {
                    self.idle.push(device);
                }
                continue;
            }

            self.state = WorkerState::Idle;
            let now = Instant::now();
            if now >= self.next_reap {
                self.engine.reap(now).await;
                self.next_reap = deadline_after(now, self.reaper_interval);
            }

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Shutdown,
                message = self.mailbox.next() => match message {
                    Some(message) => Wake::Message(message),
                    None => Wake::Disconnected,
                },
                _ = tokio::time::sleep_until(self.next_reap) => Wake::Tick,
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Message(message) => self.handle(message),
                Wake::Disconnected => {
                    debug!("Every resolver handle is gone");
                    break;
                }
                Wake::Tick => {}
            }
        }

        self.state = WorkerState::Stopped;
        self.answer_remaining();
        info!(
            "Resolver worker stopped with {} pending and {} idle devices",
            self.pending.len(),
            self.idle.len()
        );
    }

    /// Reply to status queries that raced with shutdown; drop everything else.
    fn answer_remaining(&mut self) {
        self.mailbox.close();
        while let Some(message) = self.mailbox.try_next() {
            match message {
                WorkerMessage::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                WorkerMessage::Registry(event) => {
                    debug!("Dropping registry event after shutdown: {:?}", event)
                }
            }
        }
    }

    fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Registry(RegistryEvent::Device(event)) => self.on_device(event),
            WorkerMessage::Registry(RegistryEvent::Driver(event)) => {
                self.engine.apply_driver_event(event)
            }
            WorkerMessage::Registry(RegistryEvent::Locator(event)) => {
                self.engine.apply_locator_event(event)
            }
            WorkerMessage::Registry(RegistryEvent::Selector(event)) => {
                self.engine.apply_selector_event(event)
            }
            WorkerMessage::Registry(other) => debug!("Ignoring registry event {:?}", other),
            WorkerMessage::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_device(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Added(device) => {
                info!("Device found: {:?}", device);
                self.engine.emit(ResolverEvent::DeviceFound {
                    device: device.clone(),
                });
                self.enqueue(device);
            }
            DeviceEvent::Modified(device) => {
                debug!("Device modified: {:?}", device);
                self.enqueue(device);
            }
            DeviceEvent::Removed(device) => {
                info!("Device lost: {:?}", device);
                self.pending.retain(|d| d != &device);
                self.idle.retain(|d| d != &device);
                let dropped = self.engine.forget_device(&device);
                debug!("Dropped {} cached verdicts for {:?}", dropped, device);
                self.engine.emit(ResolverEvent::DeviceLost { device });
            }
            other => debug!("Ignoring device event {:?}", other),
        }
    }

    fn enqueue(&mut self, device: DeviceRef) {
        self.idle.retain(|d| d != &device);
        if !self.pending.contains(&device) {
            self.pending.push_back(device);
        }
    }

    /// Give every device that found no driver another pass.
    fn requeue_idle(&mut self) {
        if self.idle.is_empty() {
            return;
        }
        debug!("Landscape changed, retrying {} idle devices", self.idle.len());
        for device in std::mem::take(&mut self.idle) {
            self.enqueue(device);
        }
    }

    fn status(&self) -> ResolverStatus {
        ResolverStatus {
            state: self.state,
            pending_devices: self.pending.len(),
            idle_devices: self.idle.len(),
            drivers: self.engine.drivers(),
            locators: self.engine.locators(),
            selectors: self.engine.selectors(),
            cache_entries: self.engine.cache_entries(),
            leased_modules: self.engine.leased_modules(),
        }
    }
}
