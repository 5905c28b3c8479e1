//! Drivers, driver providers and their registrations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceRef, Properties};
use crate::error::KernelResult;
use crate::module::ModuleHandle;

/// Property carrying a driver's id.
pub const DRIVER_ID: &str = "driver.id";

/// Property carrying a driver's ranking hint.
pub const SERVICE_RANKING: &str = "service.ranking";

/// Match values at or below this mean "no match".
pub const MATCH_NONE: i32 = 0;

/// A driver able to claim and operate devices.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Compatibility score for `device`; higher is better, `<= 0` is no match.
    async fn match_device(&self, device: &DeviceRef) -> KernelResult<i32>;

    /// Attach to `device`. `Some(id)` refers the resolver to another driver id.
    async fn attach(&self, device: &DeviceRef) -> KernelResult<Option<String>>;
}

/// Lazily hands out the [`Driver`] behind a registration.
///
/// The resolver only calls `acquire` when a candidate is actually needed for
/// a match, so merely registering a driver never instantiates it.
#[async_trait::async_trait]
pub trait DriverProvider: Send + Sync {
    async fn acquire(&self) -> KernelResult<Arc<dyn Driver>>;
}

/// Providers that already hold a live driver hand it out directly.
#[async_trait::async_trait]
impl<D> DriverProvider for Arc<D>
where
    D: Driver + 'static,
{
    async fn acquire(&self) -> KernelResult<Arc<dyn Driver>> {
        Ok(self.clone() as Arc<dyn Driver>)
    }
}

/// Registry-assigned identity of a driver provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}

/// A driver announcement as published by the registry.
#[derive(Clone)]
pub struct DriverRegistration {
    /// Identity used to deduplicate and retract the registration
    pub provider_id: ProviderId,
    /// Registration order; earlier registrations win score ties
    pub sequence_id: i64,
    /// Published driver properties
    pub properties: Properties,
    /// Source of the driver instance
    pub provider: Arc<dyn DriverProvider>,
    /// Module the driver lives in, if known
    pub module: Option<ModuleHandle>,
}

impl DriverRegistration {
    pub fn new(
        provider_id: ProviderId,
        sequence_id: i64,
        provider: Arc<dyn DriverProvider>,
    ) -> Self {
        Self {
            provider_id,
            sequence_id,
            properties: Properties::new(),
            provider,
            module: None,
        }
    }

    pub fn with_driver_id(mut self, id: &str) -> Self {
        self.properties
            .insert(DRIVER_ID.to_string(), serde_json::Value::from(id));
        self
    }

    pub fn with_ranking(mut self, ranking: i32) -> Self {
        self.properties
            .insert(SERVICE_RANKING.to_string(), serde_json::Value::from(ranking));
        self
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_module(mut self, module: ModuleHandle) -> Self {
        self.module = Some(module);
        self
    }

    /// Declared driver id; blank ids count as missing.
    pub fn driver_id(&self) -> Option<&str> {
        self.properties
            .get(DRIVER_ID)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Declared ranking hint, 0 when absent or not an integer.
    pub fn ranking(&self) -> i32 {
        self.properties
            .get(SERVICE_RANKING)
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0)
    }
}

impl fmt::Debug for DriverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistration")
            .field("provider_id", &self.provider_id)
            .field("sequence_id", &self.sequence_id)
            .field("driver_id", &self.driver_id())
            .field("module", &self.module)
            .finish()
    }
}
