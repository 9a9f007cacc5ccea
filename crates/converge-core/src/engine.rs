//! Convergence engine: probe, diff, plan, apply.

use crate::error::{ConvergeError, ConvergeResult};
use crate::planner::{plan, Action};
use crate::resource::{Applied, Ensure, ResourceStrategy};
use serde::Serialize;

/// Summary of one convergence pass over a resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Resource kind
    pub kind: &'static str,
    /// Resource instance name
    pub name: String,
    /// Action taken (`create`, `destroy`, `flush`, `noop`)
    pub action: &'static str,
    /// Properties that were out of sync (flush only)
    pub changed: Vec<String>,
    /// Whether the action completed
    pub outcome: Applied,
}

impl PassReport {
    /// Whether this pass changed anything on disk or remotely.
    pub fn changed_state(&self) -> bool {
        self.action != "noop" && self.outcome.is_done()
    }
}

/// Generic per-instance convergence driver.
///
/// Holds the desired state and a strategy for one resource instance. The
/// host serializes passes, so no internal locking is done.
pub struct Convergence<S: ResourceStrategy> {
    name: String,
    ensure: Ensure,
    desired: S::Desired,
    strategy: S,
}

impl<S: ResourceStrategy> Convergence<S> {
    /// Create a driver for one resource instance
    pub fn new(name: impl Into<String>, ensure: Ensure, desired: S::Desired, strategy: S) -> Self {
        Self {
            name: name.into(),
            ensure,
            desired,
            strategy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ensure(&self) -> Ensure {
        self.ensure
    }

    pub fn desired(&self) -> &S::Desired {
        &self.desired
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Probe and diff without applying anything.
    pub fn plan_pass(&mut self) -> ConvergeResult<Action<S::Property>> {
        let observed = self.strategy.probe(&self.desired)?;
        self.plan_with(observed.as_ref())
    }

    /// Run one full pass.
    ///
    /// Fatal errors are returned; non-fatal ones are logged and reported as
    /// a deferred outcome so the host retries on its next pass.
    pub fn run_pass(&mut self) -> ConvergeResult<PassReport> {
        let span = tracing::info_span!(
            "converge",
            kind = self.strategy.kind(),
            resource = %self.name,
            ensure = %self.ensure
        );
        let _guard = span.enter();

        let observed = match self.strategy.probe(&self.desired) {
            Ok(observed) => observed,
            Err(e) => return self.downgrade("probe", Vec::new(), e),
        };

        let action = match self.plan_with(observed.as_ref()) {
            Ok(action) => action,
            Err(e) => return self.downgrade("diff", Vec::new(), e),
        };

        let changed: Vec<String> = match &action {
            Action::Flush(changes) => changes.properties().iter().map(|p| p.to_string()).collect(),
            _ => Vec::new(),
        };

        tracing::debug!(action = action.name(), changed = ?changed, "Planned action");

        let result = match (&action, observed.as_ref()) {
            (Action::Noop, _) => Ok(Applied::Done),
            (Action::Create, _) => self.strategy.create(&self.desired),
            (Action::Destroy, Some(observed)) => self.strategy.destroy(&self.desired, observed),
            (Action::Flush(changes), Some(observed)) => {
                for (property, change) in changes.iter() {
                    tracing::info!(
                        property = %property,
                        observed = %change.observed,
                        desired = %change.desired,
                        "Property out of sync"
                    );
                }
                self.strategy.flush(&self.desired, observed, changes)
            }
            // plan() only yields Destroy/Flush for observed resources
            (_, None) => Ok(Applied::Done),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return self.downgrade(action.name(), changed, e),
        };

        match &outcome {
            Applied::Done if !matches!(action, Action::Noop) => {
                tracing::info!(action = action.name(), "Resource converged");
            }
            Applied::Done => tracing::debug!("Resource in sync"),
            Applied::Deferred(reason) => {
                tracing::warn!(action = action.name(), reason = %reason, "Convergence deferred");
            }
        }

        Ok(PassReport {
            kind: self.strategy.kind(),
            name: self.name.clone(),
            action: action.name(),
            changed,
            outcome,
        })
    }

    fn plan_with(&self, observed: Option<&S::Observed>) -> ConvergeResult<Action<S::Property>> {
        let changes = match (self.ensure, observed) {
            (Ensure::Present, Some(observed)) => Some(self.strategy.diff(&self.desired, observed)?),
            _ => None,
        };
        Ok(plan(self.ensure, observed.is_some(), changes))
    }

    fn downgrade(
        &self,
        stage: &'static str,
        changed: Vec<String>,
        error: ConvergeError,
    ) -> ConvergeResult<PassReport> {
        if error.is_fatal() {
            tracing::error!(stage, category = error.category(), error = %error, "Convergence failed");
            return Err(error);
        }

        tracing::warn!(stage, category = error.category(), error = %error, "Convergence deferred");

        Ok(PassReport {
            kind: self.strategy.kind(),
            name: self.name.clone(),
            action: stage,
            changed,
            outcome: Applied::Deferred(error.to_string()),
        })
    }
}
