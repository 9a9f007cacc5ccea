//! Resource lifecycle contract.
//!
//! A resource kind plugs into the engine by implementing [`ResourceStrategy`].
//! The engine owns the state machine (`Absent -> Present`, `Present -> Absent`,
//! `Present -> Present` via flush); the strategy only knows how to observe and
//! how to apply one corrective action.

use crate::changeset::ChangeSet;
use crate::error::ConvergeResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired lifecycle state of a resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ensure::Present => write!(f, "present"),
            Ensure::Absent => write!(f, "absent"),
        }
    }
}

/// Result of applying a corrective action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Applied {
    /// The action completed and observed state now matches
    Done,
    /// The action could not complete yet; retry on the next pass
    Deferred(String),
}

impl Applied {
    pub fn deferred(reason: impl Into<String>) -> Self {
        Applied::Deferred(reason.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Applied::Done)
    }
}

/// Strategy object specializing the engine for one resource kind.
pub trait ResourceStrategy {
    /// Desired state, validated at construction
    type Desired;

    /// Observed state, produced by `probe`
    type Observed;

    /// Watched properties that can drift
    type Property: Copy + Ord + fmt::Debug + fmt::Display;

    /// Resource kind name used in logs
    fn kind(&self) -> &'static str;

    /// Read observed state.
    ///
    /// `Ok(None)` means the resource is absent. Must not modify anything
    /// beyond caching for the current pass.
    fn probe(&mut self, desired: &Self::Desired) -> ConvergeResult<Option<Self::Observed>>;

    /// Compare desired against observed using semantic comparators.
    fn diff(
        &self,
        desired: &Self::Desired,
        observed: &Self::Observed,
    ) -> ConvergeResult<ChangeSet<Self::Property>>;

    /// Bring an absent resource into existence.
    fn create(&mut self, desired: &Self::Desired) -> ConvergeResult<Applied>;

    /// Remove a present resource.
    fn destroy(
        &mut self,
        desired: &Self::Desired,
        observed: &Self::Observed,
    ) -> ConvergeResult<Applied>;

    /// Apply the complete batch of drifted properties at once.
    fn flush(
        &mut self,
        desired: &Self::Desired,
        observed: &Self::Observed,
        changes: &ChangeSet<Self::Property>,
    ) -> ConvergeResult<Applied>;
}
