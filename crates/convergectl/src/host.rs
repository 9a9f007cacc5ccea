//! Host surrogate: builds the shared contexts once and drives one pass per
//! declared resource.

use crate::error::CtlResult;
use crate::manifest::{Manifest, RunnerEntry, Settings, TokenEntry};
use converge_core::{Action, Applied, Clock, ConvergeError, Convergence, PassReport, ResourceStrategy};
use registry_token::{
    inventory, RegistryTokenStrategy, TokenContext, TokenInventoryEntry, TokenIssuer, TokenSpec,
    TokenStore, TtlMode,
};
use runner_registration::{
    Registrar, ReqwestTransport, RunnerContext, RunnerRegistrationStrategy, RunnerSpec, Transport,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const TOKEN_KIND: &str = "registry_token";
const RUNNER_KIND: &str = "runner_registration";

/// Result of one resource in an apply or plan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Converged, or already in sync
    Ok,
    /// Would change (plan only)
    Pending,
    /// Not satisfied yet; retried next run
    Deferred,
    /// Rejected or failed fatally
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("ok"),
            Status::Pending => f.write_str("pending"),
            Status::Deferred => f.write_str("deferred"),
            Status::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub kind: &'static str,
    pub name: String,
    pub action: String,
    pub changed: Vec<String>,
    pub status: Status,
    pub detail: Option<String>,
}

impl ResourceOutcome {
    fn failed(kind: &'static str, name: &str, stage: &str, error: impl fmt::Display) -> Self {
        Self {
            kind,
            name: name.to_string(),
            action: stage.to_string(),
            changed: Vec::new(),
            status: Status::Failed,
            detail: Some(error.to_string()),
        }
    }

    fn from_error(kind: &'static str, name: &str, stage: &str, error: ConvergeError) -> Self {
        let status = if error.is_fatal() {
            Status::Failed
        } else {
            Status::Deferred
        };
        Self {
            status,
            ..Self::failed(kind, name, stage, error)
        }
    }
}

impl From<PassReport> for ResourceOutcome {
    fn from(report: PassReport) -> Self {
        let (status, detail) = match report.outcome {
            Applied::Done => (Status::Ok, None),
            Applied::Deferred(reason) => (Status::Deferred, Some(reason)),
        };
        Self {
            kind: report.kind,
            name: report.name,
            action: report.action.to_string(),
            changed: report.changed,
            status,
            detail,
        }
    }
}

/// Owns the read-only contexts handed to every strategy.
pub struct Host {
    clock: Arc<dyn Clock>,
    ttl_mode: TtlMode,
    tokens: Arc<TokenContext>,
    runners: Arc<RunnerContext>,
}

impl Host {
    /// Build contexts with the reqwest transport.
    pub fn new(settings: &Settings, clock: Arc<dyn Clock>) -> CtlResult<Self> {
        let transport = ReqwestTransport::new(settings.http())?;
        Self::with_transport(settings, clock, Arc::new(transport))
    }

    pub fn with_transport(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
    ) -> CtlResult<Self> {
        let owner = settings.owner()?;
        let keys = settings.key_chain();
        tracing::debug!(sources = ?keys.sources(), "Configured signing key sources");

        let tokens = Arc::new(TokenContext {
            issuer: TokenIssuer::new(Arc::new(keys)),
            store: TokenStore::new(&settings.registry_dir, owner),
            clock: clock.clone(),
        });
        let runners = Arc::new(RunnerContext {
            registrar: Registrar::new(transport),
            owner,
        });

        Ok(Self {
            clock,
            ttl_mode: settings.ttl_mode(),
            tokens,
            runners,
        })
    }

    /// Run one convergence pass for every declared resource, in manifest order.
    pub fn apply(&self, manifest: &Manifest) -> Vec<ResourceOutcome> {
        let mut outcomes = Vec::new();

        for entry in &manifest.registry_token {
            outcomes.push(match self.token_driver(entry) {
                Ok(driver) => run(driver),
                Err(outcome) => outcome,
            });
        }
        for entry in &manifest.runner {
            outcomes.push(match self.runner_driver(entry) {
                Ok(driver) => run(driver),
                Err(outcome) => outcome,
            });
        }

        outcomes
    }

    /// Probe and diff every declared resource without applying anything.
    pub fn plan(&self, manifest: &Manifest) -> Vec<ResourceOutcome> {
        let mut outcomes = Vec::new();

        for entry in &manifest.registry_token {
            outcomes.push(match self.token_driver(entry) {
                Ok(driver) => preview(driver),
                Err(outcome) => outcome,
            });
        }
        for entry in &manifest.runner {
            outcomes.push(match self.runner_driver(entry) {
                Ok(driver) => preview(driver),
                Err(outcome) => outcome,
            });
        }

        outcomes
    }

    /// Tokens currently present in the registry directory.
    pub fn inventory(&self) -> CtlResult<Vec<TokenInventoryEntry>> {
        Ok(inventory(
            &self.tokens.issuer,
            &self.tokens.store,
            self.clock.now(),
        )?)
    }

    fn token_driver(
        &self,
        entry: &TokenEntry,
    ) -> Result<Convergence<RegistryTokenStrategy>, ResourceOutcome> {
        let spec = TokenSpec::from_params(&entry.params, self.clock.now(), self.ttl_mode)
            .map_err(|e| {
                tracing::error!(resource = %entry.name, error = %e, "Invalid registry token");
                ResourceOutcome::failed(TOKEN_KIND, &entry.name, "validate", e)
            })?;

        Ok(Convergence::new(
            entry.name.clone(),
            entry.ensure,
            spec,
            RegistryTokenStrategy::new(self.tokens.clone()),
        ))
    }

    fn runner_driver(
        &self,
        entry: &RunnerEntry,
    ) -> Result<Convergence<RunnerRegistrationStrategy>, ResourceOutcome> {
        let spec = RunnerSpec::from_params(&entry.name, entry.params.clone()).map_err(|e| {
            tracing::error!(resource = %entry.name, error = %e, "Invalid runner registration");
            ResourceOutcome::failed(RUNNER_KIND, &entry.name, "validate", e)
        })?;

        Ok(Convergence::new(
            entry.name.clone(),
            entry.ensure,
            spec,
            RunnerRegistrationStrategy::new(self.runners.clone()),
        ))
    }
}

fn run<S: ResourceStrategy>(mut driver: Convergence<S>) -> ResourceOutcome {
    match driver.run_pass() {
        Ok(report) => report.into(),
        Err(e) => ResourceOutcome::from_error(driver.strategy().kind(), driver.name(), "apply", e),
    }
}

fn preview<S: ResourceStrategy>(mut driver: Convergence<S>) -> ResourceOutcome {
    let kind = driver.strategy().kind();
    let action = match driver.plan_pass() {
        Ok(action) => action,
        Err(e) => return ResourceOutcome::from_error(kind, driver.name(), "probe", e),
    };

    let changed = match &action {
        Action::Flush(changes) => changes
            .properties()
            .iter()
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    };
    let status = if matches!(action, Action::Noop) {
        Status::Ok
    } else {
        Status::Pending
    };

    ResourceOutcome {
        kind,
        name: driver.name().to_string(),
        action: action.name().to_string(),
        changed,
        status,
        detail: None,
    }
}

/// Number of outcomes that failed fatally.
pub fn failures(outcomes: &[ResourceOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| o.status == Status::Failed)
        .count()
}
