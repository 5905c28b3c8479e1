//! devmatch kernel
//!
//! Contracts between the device-to-driver resolver and its collaborators:
//! devices, drivers, locators, selectors, the module loader and the
//! registry that announces all of them. Also hosts the shared error
//! taxonomy, resolver events and configuration loading.

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod locator;
pub mod module;
pub mod registry;
pub mod selector;

pub use config::ResolverConfig;
pub use device::{Device, DeviceRef, Properties};
pub use driver::{Driver, DriverProvider, DriverRegistration, ProviderId};
pub use error::{KernelError, KernelReport, KernelResult};
pub use event::ResolverEvent;
pub use locator::{Locator, LocatorRef};
pub use module::{ModuleError, ModuleHandle, ModuleLoader};
pub use registry::{
    DeviceEvent, DriverEvent, LocatorEvent, Registry, RegistryEvent, RegistryListener,
    SelectorEvent,
};
pub use selector::{MatchCandidate, Selection, Selector, SelectorRef};
