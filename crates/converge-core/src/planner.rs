//! Action planner: picks the single corrective action for one pass.
//!
//! The planner is stateless: it takes the desired lifecycle state, whether the
//! resource was observed, and the batched property diff, and returns the one
//! action that moves the resource toward the desired state. It never executes
//! anything itself.

use crate::changeset::ChangeSet;
use crate::resource::Ensure;
use std::fmt;

/// Corrective action chosen for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<P: Ord> {
    /// Desired present, observed absent
    Create,
    /// Desired absent, observed present
    Destroy,
    /// Present on both sides but some watched properties drifted
    Flush(ChangeSet<P>),
    /// Nothing to do
    Noop,
}

impl<P: Ord> Action<P> {
    /// Action name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Destroy => "destroy",
            Action::Flush(_) => "flush",
            Action::Noop => "noop",
        }
    }
}

impl<P: Ord> fmt::Display for Action<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute the action for one pass.
///
/// `changes` is only consulted when the resource is present on both sides;
/// callers may pass `None` when no diff was computed.
pub fn plan<P: Ord>(ensure: Ensure, present: bool, changes: Option<ChangeSet<P>>) -> Action<P> {
    match (ensure, present) {
        (Ensure::Present, false) => Action::Create,
        (Ensure::Absent, true) => Action::Destroy,
        (Ensure::Absent, false) => Action::Noop,
        (Ensure::Present, true) => match changes {
            Some(changes) if !changes.is_empty() => Action::Flush(changes),
            _ => Action::Noop,
        },
    }
}
