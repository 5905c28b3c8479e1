//! The worker's inbox.
//!
//! Registry callbacks and status queries arrive on an unbounded channel. While
//! a resolution pass is running only driver updates are taken out of it; every
//! other message is set aside and handed out again once the pass is over.

use std::collections::VecDeque;

use devmatch_kernel::{DriverEvent, RegistryEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::handle::ResolverStatus;

#[derive(Debug)]
pub enum WorkerMessage {
    Registry(RegistryEvent),
    Status(oneshot::Sender<ResolverStatus>),
}

pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    deferred: VecDeque<WorkerMessage>,
}

impl Mailbox {
    pub fn new(rx: mpsc::UnboundedReceiver<WorkerMessage>) -> Self {
        Self {
            rx,
            deferred: VecDeque::new(),
        }
    }

    /// Next message without waiting.
    pub fn try_next(&mut self) -> Option<WorkerMessage> {
        self.deferred
            .pop_front()
            .or_else(|| self.rx.try_recv().ok())
    }

    /// Next message, waiting for one. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<WorkerMessage> {
        match self.deferred.pop_front() {
            Some(message) => Some(message),
            None => self.rx.recv().await,
        }
    }

    /// Driver updates that have already arrived.
    pub fn driver_events(&mut self) -> Vec<DriverEvent> {
        let mut drivers = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            self.sort(message, &mut drivers);
        }
        drivers
    }

    /// Wait until at least one driver update arrives or `deadline` passes.
    pub async fn wait_driver_events(&mut self, deadline: Instant) -> Vec<DriverEvent> {
        let mut drivers = self.driver_events();
        while drivers.is_empty() {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(message)) => self.sort(message, &mut drivers),
                Ok(None) => {
                    // Nobody can announce anything any more.
                    tokio::time::sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }
        drivers.extend(self.driver_events());
        drivers
    }

    fn sort(&mut self, message: WorkerMessage, drivers: &mut Vec<DriverEvent>) {
        match message {
            WorkerMessage::Registry(RegistryEvent::Driver(event)) => drivers.push(event),
            other => self.deferred.push_back(other),
        }
    }

    /// Refuse further messages; those already queued can still be taken.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }
}
