//! Runner registration resource strategy.

use crate::document::{set_path, RunnerDocument};
use crate::error::RunnerResult;
use crate::registrar::Registrar;
use crate::spec::{redact, RunnerSpec};
use converge_core::{Applied, ChangeSet, ConvergeResult, FileOwnership, ResourceStrategy};
use std::fmt;
use std::sync::Arc;
use toml::{Table, Value};

/// Shared read-only context for every runner instance in a run.
#[derive(Debug, Clone)]
pub struct RunnerContext {
    pub registrar: Registrar,
    pub owner: Option<FileOwnership>,
}

/// Watched runner properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunnerProperty {
    GitlabUrl,
    AuthenticationToken,
}

impl fmt::Display for RunnerProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerProperty::GitlabUrl => f.write_str("gitlab_url"),
            RunnerProperty::AuthenticationToken => f.write_str("authentication_token"),
        }
    }
}

/// Registration found in the config document whose token still verifies.
#[derive(Clone, PartialEq, Eq)]
pub struct RunnerObservation {
    pub url: String,
    pub token: String,
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl fmt::Debug for RunnerObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerObservation")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Token to persist, with the runner id when it is known.
struct Credentials {
    token: String,
    id: Option<i64>,
}

/// Converges `runners[0]` of one runner config document.
#[derive(Debug, Clone)]
pub struct RunnerRegistrationStrategy {
    ctx: Arc<RunnerContext>,
}

impl RunnerRegistrationStrategy {
    pub fn new(ctx: Arc<RunnerContext>) -> Self {
        Self { ctx }
    }

    /// Reuse the first candidate that verifies at `url`, else register.
    ///
    /// An inconclusive verification is an error, never a reason to register.
    fn acquire(
        &self,
        desired: &RunnerSpec,
        url: &str,
        candidates: &[(&str, Option<i64>)],
        allow_registration: bool,
    ) -> RunnerResult<Option<Credentials>> {
        for &(token, id) in candidates {
            if self.ctx.registrar.check(url, token)? {
                tracing::debug!(url, token = %redact(token), "Reusing verified token");
                return Ok(Some(Credentials {
                    token: token.to_string(),
                    id,
                }));
            }
        }

        if !allow_registration {
            return Ok(None);
        }

        let Some(form) = desired.registration_form() else {
            return Ok(None);
        };
        Ok(self
            .ctx
            .registrar
            .register(url, &form)
            .map(|registration| Credentials {
                token: registration.token,
                id: Some(registration.id),
            }))
    }

    fn save(&self, desired: &RunnerSpec, doc: &RunnerDocument) -> ConvergeResult<()> {
        doc.save(&desired.config, self.ctx.owner)?;
        Ok(())
    }
}

fn adopt(entry: &mut Table, url: &str, credentials: Credentials) {
    entry.insert("url".into(), Value::String(url.to_string()));
    entry.insert("token".into(), Value::String(credentials.token));
    match credentials.id {
        Some(id) => entry.insert("id".into(), Value::Integer(id)),
        None => entry.remove("id"),
    };
}

/// The desired authentication token, if any; its runner id is unknown.
fn desired_candidate(desired: &RunnerSpec) -> Vec<(&str, Option<i64>)> {
    desired
        .authentication_token
        .as_deref()
        .map(|token| (token, None))
        .into_iter()
        .collect()
}

fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn project(desired: &RunnerSpec, entry: &mut Table) {
    entry.insert("name".into(), Value::String(desired.name.clone()));
    entry.insert(
        "executor".into(),
        Value::String(desired.executor.as_str().to_string()),
    );
    if let Some(image) = &desired.docker_image {
        set_path(entry, &["docker", "image"], Value::String(image.clone()));
    }
    if !desired.environment.is_empty() {
        entry.insert("environment".into(), strings(&desired.environment));
    }
    if !desired.docker_volume.is_empty() {
        set_path(entry, &["docker", "volumes"], strings(&desired.docker_volume));
    }
    if !desired.extra_hosts.is_empty() {
        set_path(entry, &["docker", "extra_hosts"], strings(&desired.extra_hosts));
    }
}

impl ResourceStrategy for RunnerRegistrationStrategy {
    type Desired = RunnerSpec;
    type Observed = RunnerObservation;
    type Property = RunnerProperty;

    fn kind(&self) -> &'static str {
        "runner_registration"
    }

    fn probe(&mut self, desired: &RunnerSpec) -> ConvergeResult<Option<RunnerObservation>> {
        if !desired.config.exists() {
            return Ok(None);
        }

        let doc = RunnerDocument::load(&desired.config);
        let (Some(url), Some(token)) = (doc.managed_str("url"), doc.managed_str("token")) else {
            return Ok(None);
        };

        // an inconclusive verification defers the pass instead of triggering a second registration
        if !self.ctx.registrar.check(url, token)? {
            tracing::info!(url, token = %redact(token), "Stored runner token no longer verifies");
            return Ok(None);
        }

        Ok(Some(RunnerObservation {
            url: url.to_string(),
            token: token.to_string(),
            id: doc.managed_int("id"),
            name: doc.managed_str("name").map(str::to_string),
        }))
    }

    fn diff(
        &self,
        desired: &RunnerSpec,
        observed: &RunnerObservation,
    ) -> ConvergeResult<ChangeSet<RunnerProperty>> {
        let mut changes = ChangeSet::new();

        let observed_url = observed.url.trim_end_matches('/');
        if observed_url != desired.gitlab_url {
            changes.record(RunnerProperty::GitlabUrl, observed_url, &desired.gitlab_url);
        }

        if let Some(token) = &desired.authentication_token {
            if *token != observed.token {
                changes.record(
                    RunnerProperty::AuthenticationToken,
                    redact(&observed.token),
                    redact(token),
                );
            }
        }

        Ok(changes)
    }

    fn create(&mut self, desired: &RunnerSpec) -> ConvergeResult<Applied> {
        let candidates = desired_candidate(desired);
        let Some(credentials) = self.acquire(desired, &desired.gitlab_url, &candidates, true)? else {
            return Ok(Applied::deferred(
                "no verified authentication token and registration did not succeed",
            ));
        };

        let mut doc = RunnerDocument::load(&desired.config);
        doc.update_managed(|entry| {
            project(desired, entry);
            adopt(entry, &desired.gitlab_url, credentials);
        });
        self.save(desired, &doc)?;
        Ok(Applied::Done)
    }

    fn destroy(&mut self, desired: &RunnerSpec, observed: &RunnerObservation) -> ConvergeResult<Applied> {
        if !self.ctx.registrar.deregister(&observed.url, &observed.token) {
            return Ok(Applied::deferred("deregistration did not succeed, credentials kept"));
        }

        let mut doc = RunnerDocument::load(&desired.config);
        doc.update_managed(|entry| {
            for key in ["token", "id", "name"] {
                entry.remove(key);
            }
        });
        self.save(desired, &doc)?;
        Ok(Applied::Done)
    }

    fn flush(
        &mut self,
        desired: &RunnerSpec,
        observed: &RunnerObservation,
        changes: &ChangeSet<RunnerProperty>,
    ) -> ConvergeResult<Applied> {
        let url = desired.gitlab_url.as_str();

        let mut candidates = desired_candidate(desired);
        let credentials = if changes.contains(&RunnerProperty::GitlabUrl) {
            candidates.push((observed.token.as_str(), observed.id));
            self.acquire(desired, url, &candidates, true)?
        } else {
            self.acquire(desired, url, &candidates, false)?
        };

        let Some(credentials) = credentials else {
            return Ok(Applied::deferred(
                "desired token does not verify, keeping current registration",
            ));
        };

        let mut doc = RunnerDocument::load(&desired.config);
        doc.update_managed(|entry| adopt(entry, url, credentials));
        self.save(desired, &doc)?;
        Ok(Applied::Done)
    }
}
