use devmatch_kernel::{
    DeviceEvent, DeviceRef, DriverEvent, DriverRegistration, Locator, LocatorEvent, LocatorRef,
    ProviderId, Registry, RegistryListener, Selector, SelectorEvent, SelectorRef,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::driver::MockDriver;

/// An in-memory registry.
///
/// Publishing anything notifies every subscribed listener synchronously on
/// the calling thread; late subscribers get the current population replayed.
pub struct MockRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
    devices: RwLock<Vec<DeviceRef>>,
    drivers: RwLock<Vec<DriverRegistration>>,
    locators: RwLock<Vec<LocatorRef>>,
    selectors: RwLock<Vec<SelectorRef>>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
            devices: RwLock::new(Vec::new()),
            drivers: RwLock::new(Vec::new()),
            locators: RwLock::new(Vec::new()),
            selectors: RwLock::new(Vec::new()),
        }
    }
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn listeners(&self) -> Vec<Arc<dyn RegistryListener>> {
        self.listeners.read().clone()
    }

    pub fn publish_device(&self, device: DeviceRef) {
        self.devices.write().push(device.clone());
        for listener in self.listeners() {
            listener.on_device_changed(DeviceEvent::Added(device.clone()));
        }
    }

    pub fn modify_device(&self, device: &DeviceRef) {
        for listener in self.listeners() {
            listener.on_device_changed(DeviceEvent::Modified(device.clone()));
        }
    }

    pub fn retract_device(&self, device: &DeviceRef) {
        self.devices.write().retain(|d| d != device);
        for listener in self.listeners() {
            listener.on_device_changed(DeviceEvent::Removed(device.clone()));
        }
    }

    /// Publish `driver` with the given ranking hint.
    pub fn publish_driver(&self, driver: &Arc<MockDriver>, ranking: i32) -> ProviderId {
        let id = self.next_id();
        let registration = driver.registration(id, id as i64).with_ranking(ranking);
        self.publish_registration(registration);
        ProviderId(id)
    }

    /// Publish an arbitrary registration, e.g. one without a driver id.
    pub fn publish_registration(&self, registration: DriverRegistration) {
        self.drivers.write().push(registration.clone());
        for listener in self.listeners() {
            listener.on_driver_changed(DriverEvent::Added(registration.clone()));
        }
    }

    pub fn retract_driver(&self, provider: ProviderId) {
        self.drivers.write().retain(|d| d.provider_id != provider);
        for listener in self.listeners() {
            listener.on_driver_changed(DriverEvent::Removed(provider));
        }
    }

    pub fn publish_locator(&self, locator: Arc<dyn Locator>) -> u64 {
        let locator = LocatorRef::new(self.next_id(), locator);
        self.locators.write().push(locator.clone());
        for listener in self.listeners() {
            listener.on_locator_changed(LocatorEvent::Added(locator.clone()));
        }
        locator.id()
    }

    pub fn retract_locator(&self, id: u64) {
        self.locators.write().retain(|l| l.id() != id);
        for listener in self.listeners() {
            listener.on_locator_changed(LocatorEvent::Removed(id));
        }
    }

    pub fn publish_selector(&self, selector: Arc<dyn Selector>) -> u64 {
        let selector = SelectorRef::new(self.next_id(), selector);
        self.selectors.write().push(selector.clone());
        for listener in self.listeners() {
            listener.on_selector_changed(SelectorEvent::Added(selector.clone()));
        }
        selector.id()
    }

    pub fn retract_selector(&self, id: u64) {
        self.selectors.write().retain(|s| s.id() != id);
        for listener in self.listeners() {
            listener.on_selector_changed(SelectorEvent::Removed(id));
        }
    }
}

impl Registry for MockRegistry {
    fn subscribe(&self, listener: Arc<dyn RegistryListener>) {
        for registration in self.drivers.read().iter() {
            listener.on_driver_changed(DriverEvent::Added(registration.clone()));
        }
        for locator in self.locators.read().iter() {
            listener.on_locator_changed(LocatorEvent::Added(locator.clone()));
        }
        for selector in self.selectors.read().iter() {
            listener.on_selector_changed(SelectorEvent::Added(selector.clone()));
        }
        for device in self.devices.read().iter() {
            listener.on_device_changed(DeviceEvent::Added(device.clone()));
        }
        self.listeners.write().push(listener);
    }
}
