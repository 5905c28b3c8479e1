//! Resolution engine.
//!
//! Owns everything a resolution pass reads or writes: the driver mirror, the
//! match cache, the module leases and the locator and selector lists. Only
//! the worker task touches it.
//!
//! A pass for one device runs to a fixed point: seed match records from the
//! locators, bind live drivers, score what is unknown (loading modules on
//! demand when a proposed driver is not live), and once nothing is pending
//! rank the viable records and attach the winner. Referrals add a record and
//! restart the fixed point; failed attaches fall through to the next best.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use devmatch_kernel::{
    DeviceRef, DriverEvent, KernelError, LocatorEvent, LocatorRef, MatchCandidate,
    ModuleLoader, Properties, ResolverConfig, ResolverEvent, Selection, SelectorEvent,
    SelectorRef,
};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::{DeviceKey, MatchCache};
use crate::call::{guarded, guarded_infallible};
use crate::lease::{LeaseTable, deadline_after};
use crate::mailbox::Mailbox;
use crate::mirror::{DriverCandidate, DriverMirror, MirrorAdd};
use crate::reaper::{ReapReport, Reaper};
use crate::record::{LoadState, MatchRecord, MatchScore, MatchSet};

/// State of one device's resolution pass.
struct Pass {
    device: DeviceRef,
    key: DeviceKey,
    records: MatchSet,
    excluded: HashSet<String>,
    attempts: u32,
}

/// How an attach round ended.
enum Attach {
    Attached,
    Referred,
    NoDriver,
}

pub struct Engine {
    config: ResolverConfig,
    loader: Arc<dyn ModuleLoader>,
    events: broadcast::Sender<ResolverEvent>,
    reaper: Reaper,
    cache: MatchCache,
    mirror: DriverMirror,
    leases: LeaseTable,
    locators: Vec<LocatorRef>,
    selectors: Vec<SelectorRef>,
    landscape_changed: bool,
}

impl Engine {
    pub fn new(
        config: ResolverConfig,
        loader: Arc<dyn ModuleLoader>,
        events: broadcast::Sender<ResolverEvent>,
    ) -> Self {
        Self {
            reaper: Reaper::new(&config),
            config,
            loader,
            events,
            cache: MatchCache::new(),
            mirror: DriverMirror::new(),
            leases: LeaseTable::new(),
            locators: Vec::new(),
            selectors: Vec::new(),
            landscape_changed: false,
        }
    }

    pub(crate) fn emit(&self, event: ResolverEvent) {
        let _ = self.events.send(event);
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.call_timeout()
    }

    // ------------------------------------------------------------------
    // Registry updates
    // ------------------------------------------------------------------

    pub fn apply_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Added(registration) => {
                if let MirrorAdd::Added(driver_id) = self.mirror.add(registration) {
                    info!("Driver found: {}", driver_id);
                    self.emit(ResolverEvent::DriverFound { driver_id });
                    self.landscape_changed = true;
                }
            }
            DriverEvent::Removed(provider_id) => {
                if let Some(candidate) = self.mirror.remove(provider_id) {
                    info!("Driver lost: {}", candidate.id());
                    self.emit(ResolverEvent::DriverLost {
                        driver_id: candidate.id().to_string(),
                    });
                    self.landscape_changed = true;
                }
            }
            other => debug!("Ignoring driver event {:?}", other),
        }
    }

    pub fn apply_locator_event(&mut self, event: LocatorEvent) {
        match event {
            LocatorEvent::Added(locator) => {
                if !self.locators.contains(&locator) {
                    debug!("Locator added: {}", locator);
                    self.locators.push(locator);
                    self.landscape_changed = true;
                }
            }
            LocatorEvent::Removed(id) => {
                let before = self.locators.len();
                self.locators.retain(|l| l.id() != id);
                if self.locators.len() != before {
                    debug!("Locator removed: locator-{}", id);
                    self.landscape_changed = true;
                }
            }
            other => debug!("Ignoring locator event {:?}", other),
        }
    }

    pub fn apply_selector_event(&mut self, event: SelectorEvent) {
        match event {
            SelectorEvent::Added(selector) => {
                if !self.selectors.contains(&selector) {
                    debug!("Selector added: {:?}", selector);
                    self.selectors.push(selector);
                    self.landscape_changed = true;
                }
            }
            SelectorEvent::Removed(id) => {
                let before = self.selectors.len();
                self.selectors.retain(|s| s.id() != id);
                if self.selectors.len() != before {
                    debug!("Selector removed: selector-{}", id);
                    self.landscape_changed = true;
                }
            }
            other => debug!("Ignoring selector event {:?}", other),
        }
    }

    /// Whether drivers, locators or selectors changed since the last call.
    pub fn take_landscape_changed(&mut self) -> bool {
        std::mem::take(&mut self.landscape_changed)
    }

    /// Forget cached verdicts tied to this device reference.
    pub fn forget_device(&mut self, device: &DeviceRef) -> usize {
        self.cache.invalidate_device(device)
    }

    pub async fn reap(&mut self, now: Instant) -> ReapReport {
        self.reaper
            .tick(now, self.loader.as_ref(), &mut self.leases, &self.events)
            .await
    }

    pub fn drivers(&self) -> usize {
        self.mirror.len()
    }

    pub fn locators(&self) -> usize {
        self.locators.len()
    }

    pub fn selectors(&self) -> usize {
        self.selectors.len()
    }

    pub fn cache_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn leased_modules(&self) -> usize {
        self.leases.len()
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Find and attach the best driver for `device`.
    ///
    /// Returns `true` when a driver attached, or when the device is already
    /// in use and needs nothing. Driver updates arriving in `mailbox` during
    /// the pass are applied as they come; everything else stays queued.
    pub async fn resolve(&mut self, device: &DeviceRef, mailbox: &mut Mailbox) -> bool {
        if device.is_in_use() {
            debug!("Device {:?} already in use, skipping", device);
            return true;
        }

        let mut pass = self.start_pass(device).await;

        loop {
            for event in mailbox.driver_events() {
                self.apply_driver_event(event);
            }

            self.connect_live_drivers(&mut pass);
            self.score_unknown(&mut pass).await;

            if let Some(deadline) = pass.records.next_load_deadline() {
                debug!("Waiting for on-demand drivers until {:?}", deadline);
                for event in mailbox.wait_driver_events(deadline).await {
                    self.apply_driver_event(event);
                }
                continue;
            }

            match self.select_and_attach(&mut pass).await {
                Attach::Attached => return true,
                Attach::Referred => continue,
                Attach::NoDriver => {
                    self.report_no_driver(&pass.device).await;
                    return false;
                }
            }
        }
    }

    async fn start_pass(&self, device: &DeviceRef) -> Pass {
        let timeout = self.timeout();
        let props = match guarded("properties", timeout, device.properties()).await {
            Ok(props) => props,
            Err(e) => {
                warn!("Could not read properties of {:?}: {}", device, e);
                Properties::new()
            }
        };

        let key = DeviceKey::of(device, &props, &self.config.persistent_id_property);
        let mut records = MatchSet::new();

        for locator in &self.locators {
            match guarded("find_drivers", timeout, locator.find_drivers(&props)).await {
                Ok(ids) => {
                    for id in ids.iter().filter(|id| !id.trim().is_empty()) {
                        records.propose(id, locator.id());
                    }
                }
                Err(e) => warn!("Locator {} failed for {:?}: {}", locator, device, e),
            }
        }

        Pass {
            device: device.clone(),
            key,
            records,
            excluded: HashSet::new(),
            attempts: 0,
        }
    }

    fn connect_live_drivers(&self, pass: &mut Pass) {
        let live = self.mirror.snapshot();
        pass.records.unbind_missing(&live);
        for candidate in &live {
            pass.records.connect(candidate);
        }
    }

    async fn score_unknown(&mut self, pass: &mut Pass) {
        let now = Instant::now();

        for record in pass.records.iter_mut() {
            if record.score != MatchScore::Unknown {
                continue;
            }

            if let Some(bound) = record.bound.clone() {
                record.score = self.score(&pass.device, &pass.key, &bound).await;
                continue;
            }

            match record.load {
                LoadState::Idle => {
                    record.load = self.load_on_demand(record).await;
                    if record.load == LoadState::Done {
                        record.score = MatchScore::None;
                    }
                }
                LoadState::Waiting { deadline } if deadline <= now => {
                    warn!("Driver {} did not appear in time", record.driver_id);
                    record.load = LoadState::Done;
                    record.score = MatchScore::None;
                }
                LoadState::Waiting { .. } => {}
                LoadState::Done => record.score = MatchScore::None,
            }
        }
    }

    async fn score(
        &mut self,
        device: &DeviceRef,
        key: &DeviceKey,
        bound: &DriverCandidate,
    ) -> MatchScore {
        if let Some(cached) = self.cache.get(bound.id(), key) {
            debug!("Cached score {} for driver {}", cached, bound.id());
            return MatchScore::from_raw(cached);
        }

        let result = guarded("match", self.timeout(), async {
            let driver = bound.acquire().await?;
            driver.match_device(device).await
        })
        .await;

        match result {
            Ok(raw) => {
                debug!("Driver {} scored {} for {:?}", bound.id(), raw, device);
                self.cache.put(bound.id(), key.clone(), raw);
                MatchScore::from_raw(raw)
            }
            Err(e) => {
                warn!("Match by driver {} failed: {}", bound.id(), e);
                MatchScore::None
            }
        }
    }

    /// Install the module for a proposed driver that is not live.
    async fn load_on_demand(&mut self, record: &MatchRecord) -> LoadState {
        let timeout = self.timeout();
        let location = format!("{}{}", self.config.module_location_prefix, record.driver_id);

        let installed = guarded_infallible("modules", timeout, self.loader.modules())
            .await
            .unwrap_or_default();
        if installed.iter().any(|m| m.location == location) {
            debug!("Module {} already installed, not loading again", location);
            return LoadState::Done;
        }

        let sources: Vec<LocatorRef> = if record.locators.is_empty() {
            self.locators.clone()
        } else {
            self.locators
                .iter()
                .filter(|l| record.locators.contains(&l.id()))
                .cloned()
                .collect()
        };

        for locator in sources {
            let load = guarded("load_driver", timeout, locator.load_driver(&record.driver_id));
            let bytes = match load.await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Locator {} cannot load {}: {}", locator, record.driver_id, e);
                    continue;
                }
            };

            let loader = self.loader.clone();
            let install = guarded("install", timeout, async {
                loader.install(&location, bytes).await.map_err(KernelError::from)
            })
            .await;

            return match install {
                Ok(module) => {
                    let now = Instant::now();
                    info!("Installed module {} for driver {}", module, record.driver_id);
                    self.leases.grant(&module, now, self.config.short_lease());
                    self.emit(ResolverEvent::ModuleInstalled { module });
                    LoadState::Waiting {
                        deadline: deadline_after(now, self.config.driver_wait()),
                    }
                }
                Err(e) => {
                    warn!("Failed to install module for driver {}: {}", record.driver_id, e);
                    LoadState::Done
                }
            };
        }

        debug!("No locator could load driver {}", record.driver_id);
        LoadState::Done
    }

    async fn select_and_attach(&mut self, pass: &mut Pass) -> Attach {
        loop {
            let viable = pass.records.viable(&pass.excluded);
            if viable.is_empty() {
                return Attach::NoDriver;
            }

            if pass.attempts >= self.config.max_attach_attempts() {
                warn!(
                    "Giving up on {:?} after {} attach attempts",
                    pass.device, pass.attempts
                );
                return Attach::NoDriver;
            }

            let Some(index) = self.select(&pass.device, &viable).await else {
                return Attach::NoDriver;
            };
            pass.attempts += 1;

            let chosen = &viable[index];
            let Some(bound) = pass.records.bound(&chosen.driver_id).cloned() else {
                pass.excluded.insert(chosen.driver_id.clone());
                continue;
            };

            let device = pass.device.clone();
            let result = guarded("attach", self.timeout(), async {
                let driver = bound.acquire().await?;
                driver.attach(&device).await
            })
            .await;

            match result {
                Ok(None) => {
                    info!("Attached driver {} to {:?}", bound.id(), device);
                    if let Some(module) = bound.module() {
                        if module.is_on_demand(&self.config.module_location_prefix) {
                            self.leases
                                .extend(module, Instant::now(), self.config.long_lease());
                        }
                    }
                    self.emit(ResolverEvent::AttachSucceeded {
                        device,
                        driver_id: bound.id().to_string(),
                    });
                    return Attach::Attached;
                }
                Ok(Some(referral)) => {
                    info!("Driver {} referred {:?} to {}", bound.id(), device, referral);
                    pass.excluded.insert(bound.id().to_string());
                    if !referral.trim().is_empty() {
                        pass.records.ensure(&referral);
                    }
                    self.emit(ResolverEvent::Referred {
                        device,
                        driver_id: bound.id().to_string(),
                        referral,
                    });
                    return Attach::Referred;
                }
                Err(e) => {
                    error!("Driver {} failed to attach {:?}: {}", bound.id(), device, e);
                    pass.excluded.insert(bound.id().to_string());
                    self.emit(ResolverEvent::AttachFailed {
                        device,
                        driver_id: bound.id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Index into `viable` to attach, or `None` if a selector declined.
    async fn select(&self, device: &DeviceRef, viable: &[MatchCandidate]) -> Option<usize> {
        const BEST: usize = 0;

        let Some(selector) = self.selectors.first() else {
            return Some(BEST);
        };

        match guarded("select", self.timeout(), selector.select(device, viable, BEST)).await {
            Ok(Selection::Index(index)) if index < viable.len() => Some(index),
            Ok(Selection::Index(index)) => {
                warn!(
                    "Selector {:?} picked invalid index {} of {}, using best",
                    selector,
                    index,
                    viable.len()
                );
                Some(BEST)
            }
            Ok(Selection::None) => {
                debug!("Selector {:?} declined every candidate", selector);
                None
            }
            Err(e) => {
                warn!("Selector {:?} failed, using best: {}", selector, e);
                Some(BEST)
            }
        }
    }

    async fn report_no_driver(&self, device: &DeviceRef) {
        info!("No driver found for {:?}", device);
        if let Err(e) = guarded("no_driver_found", self.timeout(), device.no_driver_found()).await {
            warn!("Could not notify {:?} that no driver was found: {}", device, e);
        }
        self.emit(ResolverEvent::NoDriverFound {
            device: device.clone(),
        });
    }
}
