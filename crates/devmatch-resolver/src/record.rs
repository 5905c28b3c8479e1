//! Per-pass match records.
//!
//! A [`MatchSet`] holds one [`MatchRecord`] per distinct driver id seen while
//! resolving a single device. Records are proposed by locators, by live
//! drivers in the mirror, or by referrals, and are dropped with the pass.

use std::cmp::Ordering;
use std::collections::HashSet;

use devmatch_kernel::MatchCandidate;
use tokio::time::Instant;

use crate::mirror::DriverCandidate;

/// Compatibility verdict of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScore {
    /// Not computed yet, or waiting for the driver to show up
    Unknown,
    /// The driver does not match
    None,
    /// Positive match quality; higher is better
    Scored(i32),
}

impl MatchScore {
    pub fn from_raw(score: i32) -> Self {
        if score > devmatch_kernel::driver::MATCH_NONE {
            MatchScore::Scored(score)
        } else {
            MatchScore::None
        }
    }

    pub fn value(&self) -> Option<i32> {
        match self {
            MatchScore::Scored(score) => Some(*score),
            _ => None,
        }
    }
}

/// On-demand loading progress of an unbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    /// Module installed, driver announcement expected before `deadline`
    Waiting { deadline: Instant },
    /// Loading was attempted and is over, successful or not
    Done,
}

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub driver_id: String,
    pub score: MatchScore,
    /// Ids of the locators that proposed this driver
    pub locators: Vec<u64>,
    pub bound: Option<DriverCandidate>,
    pub load: LoadState,
}

impl MatchRecord {
    fn new(driver_id: &str) -> Self {
        Self {
            driver_id: driver_id.to_string(),
            score: MatchScore::Unknown,
            locators: Vec::new(),
            bound: None,
            load: LoadState::Idle,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.load, LoadState::Waiting { .. }) && self.bound.is_none()
    }

    /// The ranking view of this record, if it is viable.
    pub fn candidate(&self) -> Option<MatchCandidate> {
        let bound = self.bound.as_ref()?;
        let score = self.score.value()?;
        Some(MatchCandidate {
            driver_id: self.driver_id.clone(),
            score,
            ranking: bound.ranking(),
            sequence_id: bound.sequence_id(),
        })
    }
}

/// The records of one resolution pass, at most one per driver id.
#[derive(Debug, Default)]
pub struct MatchSet {
    records: Vec<MatchRecord>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, driver_id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.driver_id == driver_id)
    }

    /// Record that `locator` proposed `driver_id`.
    pub fn propose(&mut self, driver_id: &str, locator: u64) {
        let record = self.ensure(driver_id);
        if !record.locators.contains(&locator) {
            record.locators.push(locator);
        }
    }

    /// The record for `driver_id`, created if missing.
    pub fn ensure(&mut self, driver_id: &str) -> &mut MatchRecord {
        let index = match self.position(driver_id) {
            Some(index) => index,
            None => {
                self.records.push(MatchRecord::new(driver_id));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    /// Bind a live driver to the record with its id.
    ///
    /// A record that is already bound keeps its driver, unless that driver
    /// has since disappeared (see [`unbind_missing`](Self::unbind_missing)).
    /// Binding an unbound record restarts its scoring.
    pub fn connect(&mut self, candidate: &DriverCandidate) {
        let record = self.ensure(candidate.id());
        if record.bound.is_none() {
            record.bound = Some(candidate.clone());
            record.score = MatchScore::Unknown;
        }
    }

    /// Unbind records whose driver is no longer live. Their verdict is
    /// forgotten so that a replacement with the same id gets scored; no
    /// module is loaded on their behalf.
    pub fn unbind_missing(&mut self, live: &[DriverCandidate]) {
        for record in &mut self.records {
            let gone = record.bound.as_ref().is_some_and(|bound| {
                !live.iter().any(|c| c.provider_id() == bound.provider_id())
            });
            if gone {
                record.bound = None;
                record.score = MatchScore::Unknown;
                record.load = LoadState::Done;
            }
        }
    }

    /// Viable candidates, best first, skipping `excluded` driver ids.
    pub fn viable(&self, excluded: &HashSet<String>) -> Vec<MatchCandidate> {
        let mut viable: Vec<_> = self
            .records
            .iter()
            .filter(|r| !excluded.contains(&r.driver_id))
            .filter_map(MatchRecord::candidate)
            .collect();
        viable.sort_by(rank);
        viable
    }

    pub fn bound(&self, driver_id: &str) -> Option<&DriverCandidate> {
        self.records
            .iter()
            .find(|r| r.driver_id == driver_id)
            .and_then(|r| r.bound.as_ref())
    }

    /// Earliest deadline among records waiting for their driver.
    pub fn next_load_deadline(&self) -> Option<Instant> {
        self.records
            .iter()
            .filter(|r| r.is_waiting())
            .filter_map(|r| match r.load {
                LoadState::Waiting { deadline } => Some(deadline),
                _ => None,
            })
            .min()
    }

    pub fn get(&self, driver_id: &str) -> Option<&MatchRecord> {
        self.records.iter().find(|r| r.driver_id == driver_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MatchRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Best first: highest score, then highest ranking, then earliest
/// registration. The driver id settles anything left.
pub fn rank(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.ranking.cmp(&a.ranking))
        .then_with(|| a.sequence_id.cmp(&b.sequence_id))
        .then_with(|| a.driver_id.cmp(&b.driver_id))
}
