//! # convergectl
//!
//! Host for the registry-token and runner-registration resources. Loads a
//! manifest, builds the shared read-only contexts once, and runs one
//! convergence pass per declared resource.
//!
//! ```toml
//! [settings]
//! registry_dir = "/etc/docker/registry"
//!
//! [[registry_token]]
//! name = "ci"
//! subject = "gitlab-ci"
//! access = "group/app"
//!
//! [[runner]]
//! name = "build-runner"
//! gitlab_url = "https://gitlab.example.com"
//! registration_token = "biQgCE4CYrKucV6zsKxW"
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod host;
pub mod manifest;
pub mod output;

pub use error::{CtlError, CtlResult};
pub use host::{failures, Host, ResourceOutcome, Status};
pub use manifest::{Manifest, RunnerEntry, Settings, TokenEntry};
pub use output::OutputFormat;
