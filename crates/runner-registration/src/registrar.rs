//! Client for the runners API: verify, register, deregister.

use crate::error::{RunnerError, RunnerResult};
use crate::spec::redact;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const RUNNERS_PATH: &str = "/api/v4/runners";
const VERIFY_PATH: &str = "/api/v4/runners/verify";

/// Credentials returned by a successful registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub token: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("token", &redact(&self.token))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationReply {
    id: Option<i64>,
    token: Option<String>,
}

/// Talks to `<gitlab_url>/api/v4/runners`.
///
/// Transport failures never escape [`verify`](Self::verify),
/// [`register`](Self::register) or [`deregister`](Self::deregister): they are
/// logged and reported as an unsuccessful result.
#[derive(Clone)]
pub struct Registrar {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar").finish_non_exhaustive()
    }
}

impl Registrar {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Verify an authentication token, surfacing inconclusive answers.
    ///
    /// 200 means live and 401/403/404 mean rejected. Transport failures and
    /// any other status are a network error, so callers can retry later.
    pub fn check(&self, url: &str, token: &str) -> RunnerResult<bool> {
        let reply = self
            .transport
            .post_form(&format!("{}{}", url, VERIFY_PATH), &[("token", token.to_string())])?;
        tracing::debug!(url, token = %redact(token), status = reply.status, "Verified runner token");
        match reply.status {
            200 => Ok(true),
            401 | 403 | 404 => Ok(false),
            status => Err(RunnerError::Network(format!(
                "token verification answered with status {}",
                status
            ))),
        }
    }

    /// Whether `token` is a live authentication token at `url`.
    pub fn verify(&self, url: &str, token: &str) -> bool {
        self.check(url, token).unwrap_or_else(|e| {
            tracing::warn!(url, error = %e, "Runner token verification failed");
            false
        })
    }

    /// Register a runner; `None` unless the server answers 201 with both
    /// `id` and `token`.
    pub fn register(&self, url: &str, form: &[(&str, String)]) -> Option<Registration> {
        let reply = match self
            .transport
            .post_form(&format!("{}{}", url, RUNNERS_PATH), form)
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(url, error = %e, "Runner registration request failed");
                return None;
            }
        };

        if reply.status != 201 {
            tracing::warn!(url, status = reply.status, "Runner registration rejected");
            return None;
        }

        match serde_json::from_str::<RegistrationReply>(&reply.body) {
            Ok(RegistrationReply {
                id: Some(id),
                token: Some(token),
            }) if !token.is_empty() => {
                tracing::info!(url, id, "Registered runner");
                Some(Registration { id, token })
            }
            Ok(_) => {
                tracing::warn!(url, "Registration reply is missing id or token");
                None
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Registration reply is not JSON");
                None
            }
        }
    }

    /// Remove a runner; true iff the server answers 204.
    pub fn deregister(&self, url: &str, token: &str) -> bool {
        match self
            .transport
            .delete_form(&format!("{}{}", url, RUNNERS_PATH), &[("token", token.to_string())])
        {
            Ok(reply) if reply.status == 204 => {
                tracing::info!(url, token = %redact(token), "Deregistered runner");
                true
            }
            Ok(reply) => {
                tracing::warn!(url, status = reply.status, "Runner deregistration rejected");
                false
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Runner deregistration request failed");
                false
            }
        }
    }
}
