//! Scenario files for `devmatch simulate`.
//!
//! A scenario lists drivers already registered, drivers that only exist as
//! loadable modules, locators, an optional selector preference and the
//! devices to announce, in that order.
//!
//! ```yaml
//! drivers:
//!   - { id: drv-a, score: 10 }
//!   - { id: drv-b, score: 40, ranking: 5 }
//! modules:
//!   - { id: drv-x, score: 25 }
//! locators:
//!   - { hints: [drv-x], category: sensor, loads: [drv-x] }
//! prefer: drv-a
//! devices:
//!   - { category: thermostat, id: dev-1 }
//!   - { category: sensor }
//! ```

use std::path::Path;
use std::sync::Arc;

use devmatch_kernel::Properties;
use devmatch_kernel::config::{ConfigResult, load_config};
use devmatch_testing::{MockDriver, MockLocator};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Drivers registered before any device shows up
    pub drivers: Vec<DriverSpec>,
    /// Drivers only reachable by loading their module on demand
    pub modules: Vec<DriverSpec>,
    pub locators: Vec<LocatorSpec>,
    /// Driver id a selector should prefer over the built-in ranking
    pub prefer: Option<String>,
    /// Property bags of the devices to announce
    pub devices: Vec<Properties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverSpec {
    pub id: String,
    pub score: i32,
    #[serde(default)]
    pub ranking: i32,
    /// Driver id to refer devices to instead of attaching
    #[serde(default)]
    pub referral: Option<String>,
    /// Make attach fail with this message
    #[serde(default)]
    pub fail_attach: Option<String>,
}

impl DriverSpec {
    pub fn build(&self) -> Arc<MockDriver> {
        let mut driver = MockDriver::new(&self.id, self.score);
        if let Some(referral) = &self.referral {
            driver = driver.with_referral(referral);
        }
        if let Some(message) = &self.fail_attach {
            driver = driver.with_failing_attach(message);
        }
        Arc::new(driver)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocatorSpec {
    /// Driver ids proposed for matching devices
    pub hints: Vec<String>,
    /// Only propose for devices of this category
    pub category: Option<String>,
    /// Driver ids this locator can serve module bytes for
    pub loads: Vec<String>,
}

impl LocatorSpec {
    pub fn build(&self) -> MockLocator {
        let mut locator = MockLocator::new();
        for hint in &self.hints {
            locator = locator.with_hint(hint);
        }
        if let Some(category) = &self.category {
            locator = locator.for_category(category);
        }
        for id in &self.loads {
            locator = locator.with_module(id, id.as_bytes());
        }
        locator
    }
}

impl Scenario {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        load_config(path)
    }
}
