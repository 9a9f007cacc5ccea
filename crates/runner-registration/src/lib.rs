//! # Runner Registration
//!
//! Registers a CI runner with a GitLab instance and keeps the runner's
//! config document in step with the registration.
//!
//! ## Remote API
//!
//! | Call | Request | Success |
//! |------|---------|---------|
//! | register | `POST /api/v4/runners` | `201` with `id` and `token` |
//! | verify | `POST /api/v4/runners/verify` | `200` |
//! | deregister | `DELETE /api/v4/runners` | `204` |
//!
//! Requests are form-encoded, follow at most five redirects and time out
//! after five seconds. A transport failure is logged and treated as an
//! unsuccessful call; it never aborts the run.
//!
//! ## Key Components
//!
//! - [`RunnerSpec`]: validated desired state
//! - [`Registrar`]: the three API calls over a [`Transport`]
//! - [`RunnerDocument`]: whole-file load/seed/save of `config.toml`
//! - [`RunnerRegistrationStrategy`]: the resource strategy plugged into
//!   [`converge_core::Convergence`]

#![deny(unsafe_code)]

pub mod document;
pub mod error;
pub mod registrar;
pub mod resource;
pub mod spec;
pub mod transport;

pub use document::RunnerDocument;
pub use error::{RunnerError, RunnerResult};
pub use registrar::{Registrar, Registration};
pub use resource::{RunnerContext, RunnerObservation, RunnerProperty, RunnerRegistrationStrategy};
pub use spec::{AccessLevel, Executor, RunnerParams, RunnerSpec};
pub use transport::{HttpReply, HttpSettings, ReqwestTransport, Transport};
