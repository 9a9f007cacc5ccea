//! Desired runner registration state.

use crate::error::{RunnerError, RunnerResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Default runner config document.
pub const DEFAULT_CONFIG_PATH: &str = "/srv/gitlab-runner/config/config.toml";

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_A-Za-z0-9-]+$").expect("token pattern is valid"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("tag pattern is valid"));

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").expect("env pattern is valid"));

/// Which refs a runner may pick jobs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    NotProtected,
    RefProtected,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::NotProtected => "not_protected",
            AccessLevel::RefProtected => "ref_protected",
        }
    }
}

/// Runner executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Executor {
    #[default]
    #[serde(rename = "docker")]
    Docker,
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "ssh")]
    Ssh,
    #[serde(rename = "virtualbox")]
    Virtualbox,
    #[serde(rename = "docker+machine")]
    DockerMachine,
    #[serde(rename = "kubernetes")]
    Kubernetes,
    #[serde(rename = "custom")]
    Custom,
}

impl Executor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Executor::Docker => "docker",
            Executor::Shell => "shell",
            Executor::Ssh => "ssh",
            Executor::Virtualbox => "virtualbox",
            Executor::DockerMachine => "docker+machine",
            Executor::Kubernetes => "kubernetes",
            Executor::Custom => "custom",
        }
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Runner parameters as written in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerParams {
    #[serde(default)]
    pub registration_token: Option<String>,
    #[serde(default)]
    pub authentication_token: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag_list: OneOrMany,
    #[serde(default = "default_true")]
    pub run_untagged: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub access_level: AccessLevel,
    #[serde(default)]
    pub executor: Executor,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub environment: OneOrMany,
    #[serde(default)]
    pub docker_volume: OneOrMany,
    #[serde(default)]
    pub extra_hosts: OneOrMany,
    pub gitlab_url: String,
    #[serde(default = "default_config")]
    pub config: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_config() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

impl RunnerParams {
    /// Parameters with every optional field at its default.
    pub fn new(gitlab_url: impl Into<String>) -> Self {
        Self {
            registration_token: None,
            authentication_token: None,
            description: None,
            tag_list: OneOrMany::default(),
            run_untagged: true,
            locked: false,
            access_level: AccessLevel::default(),
            executor: Executor::default(),
            docker_image: None,
            environment: OneOrMany::default(),
            docker_volume: OneOrMany::default(),
            extra_hosts: OneOrMany::default(),
            gitlab_url: gitlab_url.into(),
            config: default_config(),
        }
    }
}

/// Validated desired state of one runner registration.
#[derive(Clone, PartialEq)]
pub struct RunnerSpec {
    pub name: String,
    pub description: String,
    pub registration_token: Option<String>,
    pub authentication_token: Option<String>,
    pub tag_list: Vec<String>,
    pub run_untagged: bool,
    pub locked: bool,
    pub access_level: AccessLevel,
    pub executor: Executor,
    pub docker_image: Option<String>,
    pub environment: Vec<String>,
    pub docker_volume: Vec<String>,
    pub extra_hosts: Vec<String>,
    /// Base URL without trailing slashes
    pub gitlab_url: String,
    pub config: PathBuf,
}

impl RunnerSpec {
    pub fn from_params(name: &str, params: RunnerParams) -> RunnerResult<Self> {
        if name.trim().is_empty() {
            return Err(RunnerError::invalid("name", "must not be empty"));
        }

        let registration_token = check_token("registration_token", params.registration_token)?;
        let authentication_token =
            check_token("authentication_token", params.authentication_token)?;
        if registration_token.is_none() && authentication_token.is_none() {
            return Err(RunnerError::invalid(
                "registration_token",
                "either a registration or an authentication token must be provided",
            ));
        }

        let tag_list = params.tag_list.into_vec();
        if let Some(tag) = tag_list.iter().find(|t| !TAG.is_match(t)) {
            return Err(RunnerError::invalid(
                "tag_list",
                format!("'{}' must be an alphanumeric string", tag),
            ));
        }

        let environment = params.environment.into_vec();
        if let Some(var) = environment.iter().find(|v| !ENV_VAR.is_match(v)) {
            return Err(RunnerError::invalid(
                "environment",
                format!("'{}' is not of the form KEY=VALUE", var),
            ));
        }

        let docker_volume = params.docker_volume.into_vec();
        if let Some(volume) = docker_volume.iter().find(|v| !is_volume(v)) {
            return Err(RunnerError::invalid(
                "docker_volume",
                format!("'{}' is not of the form host:container[:mode]", volume),
            ));
        }

        let extra_hosts = params.extra_hosts.into_vec();
        if let Some(host) = extra_hosts.iter().find(|h| !is_extra_host(h)) {
            return Err(RunnerError::invalid(
                "extra_hosts",
                format!("'{}' is not of the form hostname:ip", host),
            ));
        }

        if !params.config.is_absolute() {
            return Err(RunnerError::invalid(
                "config",
                format!("{} must be an absolute path", params.config.display()),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            description: params.description.unwrap_or_else(|| name.to_string()),
            registration_token,
            authentication_token,
            tag_list,
            run_untagged: params.run_untagged,
            locked: params.locked,
            access_level: params.access_level,
            executor: params.executor,
            docker_image: params.docker_image.filter(|image| !image.is_empty()),
            environment,
            docker_volume,
            extra_hosts,
            gitlab_url: normalize_url(&params.gitlab_url)?,
            config: params.config,
        })
    }

    /// Form fields for `POST /api/v4/runners`, if a registration token is set.
    pub fn registration_form(&self) -> Option<Vec<(&'static str, String)>> {
        let token = self.registration_token.as_ref()?;

        let mut form = vec![
            ("token", token.clone()),
            ("description", self.description.clone()),
        ];
        if !self.tag_list.is_empty() {
            form.push(("tag_list", self.tag_list.join(",")));
        }
        form.push(("run_untagged", self.run_untagged.to_string()));
        form.push(("locked", self.locked.to_string()));
        form.push(("access_level", self.access_level.as_str().to_string()));
        Some(form)
    }
}

impl fmt::Debug for RunnerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSpec")
            .field("name", &self.name)
            .field("gitlab_url", &self.gitlab_url)
            .field("executor", &self.executor)
            .field("tag_list", &self.tag_list)
            .field("config", &self.config)
            .field("registration_token", &self.registration_token.as_deref().map(redact))
            .field("authentication_token", &self.authentication_token.as_deref().map(redact))
            .finish_non_exhaustive()
    }
}

/// Short, non-secret rendering of a token for logs.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{}***", prefix)
}

fn check_token(field: &str, token: Option<String>) -> RunnerResult<Option<String>> {
    match token {
        None => Ok(None),
        Some(token) if token.is_empty() => Err(RunnerError::invalid(field, "could not be empty")),
        Some(token) if !TOKEN.is_match(&token) => Err(RunnerError::invalid(
            field,
            "may only contain letters, digits, '_' and '-'",
        )),
        Some(token) => Ok(Some(token)),
    }
}

fn is_volume(volume: &str) -> bool {
    let parts: Vec<&str> = volume.split(':').collect();
    matches!(parts.len(), 2 | 3) && parts.iter().all(|p| !p.is_empty())
}

fn is_extra_host(entry: &str) -> bool {
    match entry.split_once(':') {
        Some((host, ip)) => !host.is_empty() && ip.parse::<IpAddr>().is_ok(),
        None => false,
    }
}

/// Validate an http(s) URL and strip trailing slashes.
pub fn normalize_url(raw: &str) -> RunnerResult<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| RunnerError::invalid("gitlab_url", format!("'{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RunnerError::invalid(
            "gitlab_url",
            format!("'{}' must use http or https", raw),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RunnerParams {
        RunnerParams {
            registration_token: Some("biQgCE4CYrKucV6zsKxW".into()),
            ..RunnerParams::new("https://build.domain.com/")
        }
    }

    #[test]
    fn test_defaults() {
        let spec = RunnerSpec::from_params("build-runner", params()).unwrap();
        assert_eq!(spec.description, "build-runner");
        assert_eq!(spec.gitlab_url, "https://build.domain.com");
        assert_eq!(spec.executor, Executor::Docker);
        assert_eq!(spec.access_level, AccessLevel::NotProtected);
        assert!(spec.run_untagged);
        assert!(!spec.locked);
        assert_eq!(spec.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_some_token_required() {
        let p = RunnerParams::new("https://build.domain.com");
        assert!(RunnerSpec::from_params("r", p).is_err());

        let p = RunnerParams {
            authentication_token: Some("glrt-abc_123".into()),
            ..RunnerParams::new("https://build.domain.com")
        };
        assert!(RunnerSpec::from_params("r", p).is_ok());
    }

    #[test]
    fn test_token_grammar() {
        let p = RunnerParams {
            registration_token: Some("has space".into()),
            ..params()
        };
        assert!(RunnerSpec::from_params("r", p).is_err());

        let p = RunnerParams {
            registration_token: Some(String::new()),
            ..params()
        };
        assert!(RunnerSpec::from_params("r", p).is_err());
    }

    #[test]
    fn test_url_validation() {
        for bad in ["ftp://host", "not a url", "build.domain.com"] {
            let p = RunnerParams {
                gitlab_url: bad.into(),
                ..params()
            };
            assert!(RunnerSpec::from_params("r", p).is_err(), "{}", bad);
        }
        assert_eq!(normalize_url("http://host:8080///").unwrap(), "http://host:8080");
    }

    #[test]
    fn test_list_fields() {
        let p = RunnerParams {
            tag_list: OneOrMany::Many(vec!["rpm".into(), "build-2".into()]),
            environment: OneOrMany::One("GIT_DEPTH=1".into()),
            docker_volume: OneOrMany::Many(vec!["/srv/cache:/cache:rw".into(), "/a:/b".into()]),
            extra_hosts: OneOrMany::Many(vec!["gitlab.local:10.0.0.2".into(), "v6:::1".into()]),
            ..params()
        };
        let spec = RunnerSpec::from_params("r", p).unwrap();
        assert_eq!(spec.environment, vec!["GIT_DEPTH=1"]);
        assert_eq!(spec.extra_hosts.len(), 2);

        for (field, bad) in [
            ("tag", OneOrMany::One("rpm,build".into())),
            ("env", OneOrMany::One("NOVALUE".into())),
            ("volume", OneOrMany::One("/cache".into())),
            ("host", OneOrMany::One("gitlab.local:not-an-ip".into())),
        ] {
            let mut p = params();
            match field {
                "tag" => p.tag_list = bad,
                "env" => p.environment = bad,
                "volume" => p.docker_volume = bad,
                _ => p.extra_hosts = bad,
            }
            assert!(RunnerSpec::from_params("r", p).is_err(), "{}", field);
        }
    }

    #[test]
    fn test_config_must_be_absolute() {
        let p = RunnerParams {
            config: PathBuf::from("config.toml"),
            ..params()
        };
        assert!(RunnerSpec::from_params("r", p).is_err());
    }

    #[test]
    fn test_registration_form() {
        let p = RunnerParams {
            tag_list: OneOrMany::Many(vec!["a".into(), "b".into()]),
            access_level: AccessLevel::RefProtected,
            ..params()
        };
        let spec = RunnerSpec::from_params("build-runner", p).unwrap();
        let form = spec.registration_form().unwrap();

        assert!(form.contains(&("token", "biQgCE4CYrKucV6zsKxW".to_string())));
        assert!(form.contains(&("tag_list", "a,b".to_string())));
        assert!(form.contains(&("run_untagged", "true".to_string())));
        assert!(form.contains(&("locked", "false".to_string())));
        assert!(form.contains(&("access_level", "ref_protected".to_string())));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let spec = RunnerSpec::from_params("r", params()).unwrap();
        let rendered = format!("{:?}", spec);
        assert!(rendered.contains("biQg***"));
        assert!(!rendered.contains("biQgCE4CYrKucV6zsKxW"));
    }

    #[test]
    fn test_params_from_toml() {
        let p: RunnerParams = toml::from_str(
            r#"
            gitlab_url = "https://build.domain.com/"
            registration_token = "biQgCE4CYrKucV6zsKxW"
            tag_list = ["rpm", "build"]
            executor = "docker+machine"
            access_level = "ref_protected"
            "#,
        )
        .unwrap();
        assert_eq!(p.executor, Executor::DockerMachine);
        assert_eq!(p.access_level, AccessLevel::RefProtected);
        assert!(p.run_untagged);
    }
}
