//! Driver registry mirror
//!
//! The worker's private list of live driver candidates, kept in sync with
//! registry notifications. Candidates are appended and removed, never
//! reordered; ranking happens per resolution pass.

use std::fmt;
use std::sync::Arc;

use devmatch_kernel::{
    Driver, DriverProvider, DriverRegistration, KernelResult, ModuleHandle, ProviderId,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// A live driver as seen by the resolver.
///
/// The driver instance is acquired from its provider on first use and then
/// shared by every clone of the candidate.
#[derive(Clone)]
pub struct DriverCandidate {
    id: String,
    ranking: i32,
    sequence_id: i64,
    provider_id: ProviderId,
    module: Option<ModuleHandle>,
    provider: Arc<dyn DriverProvider>,
    instance: Arc<OnceCell<Arc<dyn Driver>>>,
}

impl DriverCandidate {
    /// `None` if the registration declares no driver id.
    pub fn from_registration(registration: DriverRegistration) -> Option<Self> {
        let id = registration.driver_id()?.to_string();
        Some(Self {
            ranking: registration.ranking(),
            id,
            sequence_id: registration.sequence_id,
            provider_id: registration.provider_id,
            module: registration.module,
            provider: registration.provider,
            instance: Arc::new(OnceCell::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ranking(&self) -> i32 {
        self.ranking
    }

    pub fn sequence_id(&self) -> i64 {
        self.sequence_id
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn module(&self) -> Option<&ModuleHandle> {
        self.module.as_ref()
    }

    /// Whether the driver instance has been acquired.
    pub fn is_loaded(&self) -> bool {
        self.instance.initialized()
    }

    /// The driver instance, acquiring it on first call.
    pub async fn acquire(&self) -> KernelResult<Arc<dyn Driver>> {
        self.instance
            .get_or_try_init(|| self.provider.acquire())
            .await
            .cloned()
    }
}

impl fmt::Debug for DriverCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCandidate")
            .field("id", &self.id)
            .field("ranking", &self.ranking)
            .field("sequence_id", &self.sequence_id)
            .field("provider_id", &self.provider_id)
            .field("module", &self.module)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Result of offering a registration to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAdd {
    /// Accepted under this driver id
    Added(String),
    /// Same provider already mirrored
    Duplicate,
    /// Rejected for lack of a driver id
    MissingId,
}

#[derive(Debug, Default)]
pub struct DriverMirror {
    candidates: Vec<DriverCandidate>,
}

impl DriverMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: DriverRegistration) -> MirrorAdd {
        if self.contains(registration.provider_id) {
            debug!("Driver provider {} already mirrored", registration.provider_id);
            return MirrorAdd::Duplicate;
        }

        let provider_id = registration.provider_id;
        match DriverCandidate::from_registration(registration) {
            Some(candidate) => {
                let id = candidate.id.clone();
                self.candidates.push(candidate);
                MirrorAdd::Added(id)
            }
            None => {
                warn!("Ignoring driver {} without a driver id", provider_id);
                MirrorAdd::MissingId
            }
        }
    }

    pub fn remove(&mut self, provider_id: ProviderId) -> Option<DriverCandidate> {
        let index = self
            .candidates
            .iter()
            .position(|c| c.provider_id == provider_id)?;
        Some(self.candidates.remove(index))
    }

    pub fn contains(&self, provider_id: ProviderId) -> bool {
        self.candidates.iter().any(|c| c.provider_id == provider_id)
    }

    pub fn snapshot(&self) -> Vec<DriverCandidate> {
        self.candidates.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
