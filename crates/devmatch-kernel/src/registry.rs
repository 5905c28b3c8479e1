//! Registry change notifications.
//!
//! The registry publishes devices, drivers, locators and selectors and tells
//! its listeners about every change. Listeners may be called from any thread
//! and must not block.

use crate::device::DeviceRef;
use crate::driver::{DriverRegistration, ProviderId};
use crate::locator::LocatorRef;
use crate::selector::SelectorRef;

/// Device lifecycle changes
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceEvent {
    Added(DeviceRef),
    Modified(DeviceRef),
    Removed(DeviceRef),
}

/// Driver lifecycle changes
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DriverEvent {
    Added(DriverRegistration),
    Removed(ProviderId),
}

/// Locator lifecycle changes
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum LocatorEvent {
    Added(LocatorRef),
    Removed(u64),
}

/// Selector lifecycle changes
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SelectorEvent {
    Added(SelectorRef),
    Removed(u64),
}

/// Any registry notification.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RegistryEvent {
    Device(DeviceEvent),
    Driver(DriverEvent),
    Locator(LocatorEvent),
    Selector(SelectorEvent),
}

impl From<DeviceEvent> for RegistryEvent {
    fn from(event: DeviceEvent) -> Self {
        Self::Device(event)
    }
}

impl From<DriverEvent> for RegistryEvent {
    fn from(event: DriverEvent) -> Self {
        Self::Driver(event)
    }
}

impl From<LocatorEvent> for RegistryEvent {
    fn from(event: LocatorEvent) -> Self {
        Self::Locator(event)
    }
}

impl From<SelectorEvent> for RegistryEvent {
    fn from(event: SelectorEvent) -> Self {
        Self::Selector(event)
    }
}

/// Receives registry notifications.
pub trait RegistryListener: Send + Sync {
    fn on_device_changed(&self, event: DeviceEvent);
    fn on_driver_changed(&self, event: DriverEvent);
    fn on_locator_changed(&self, event: LocatorEvent);
    fn on_selector_changed(&self, event: SelectorEvent);
}

/// A registry that can be subscribed to.
pub trait Registry: Send + Sync {
    /// Register `listener`. Already published objects are replayed as `Added`.
    fn subscribe(&self, listener: std::sync::Arc<dyn RegistryListener>);
}
