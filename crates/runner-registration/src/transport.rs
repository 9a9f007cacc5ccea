//! HTTP transport for the runners API.

use crate::error::{RunnerError, RunnerResult};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Method;
use url::Url;
use std::time::Duration;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Form-encoded request seam; tests substitute a fake.
pub trait Transport: Send + Sync {
    fn post_form(&self, url: &str, form: &[(&str, String)]) -> RunnerResult<HttpReply>;

    fn delete_form(&self, url: &str, form: &[(&str, String)]) -> RunnerResult<HttpReply>;
}

/// Timeouts and redirect policy for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    /// Bound on the whole request, from connect to the end of the body
    pub request_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            max_redirects: 5,
        }
    }
}

/// Blocking reqwest transport.
///
/// Redirects are followed here rather than by reqwest, which would turn a
/// POST or DELETE answered with 301/302 into a GET without the form.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    max_redirects: usize,
}

impl ReqwestTransport {
    pub fn new(settings: HttpSettings) -> RunnerResult<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_redirects: settings.max_redirects,
        })
    }

    /// Send `form` with `method`, re-sending it unchanged to every `Location`.
    fn send(&self, method: Method, url: &str, form: &[(&str, String)]) -> RunnerResult<HttpReply> {
        let mut target = Url::parse(url)
            .map_err(|e| RunnerError::Network(format!("invalid url {}: {}", url, e)))?;
        let mut hops = 0;

        loop {
            let response = self
                .client
                .request(method.clone(), target.clone())
                .form(form)
                .send()?;
            let status = response.status().as_u16();

            if let Some(location) = redirect_location(status, response.headers()) {
                if hops == self.max_redirects {
                    return Err(RunnerError::Network(format!(
                        "more than {} redirects from {}",
                        self.max_redirects, url
                    )));
                }
                hops += 1;
                let next = target.join(&location).map_err(|e| {
                    RunnerError::Network(format!("invalid redirect location {}: {}", location, e))
                })?;
                tracing::debug!(from = %target, to = %next, status, "Following redirect");
                target = next;
                continue;
            }

            let body = response.text()?;
            return Ok(HttpReply { status, body });
        }
    }
}

fn redirect_location(status: u16, headers: &HeaderMap) -> Option<String> {
    if !matches!(status, 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl Transport for ReqwestTransport {
    fn post_form(&self, url: &str, form: &[(&str, String)]) -> RunnerResult<HttpReply> {
        self.send(Method::POST, url, form)
    }

    fn delete_form(&self, url: &str, form: &[(&str, String)]) -> RunnerResult<HttpReply> {
        self.send(Method::DELETE, url, form)
    }
}
