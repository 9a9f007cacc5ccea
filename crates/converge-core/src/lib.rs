//! # Converge Core - Resource Lifecycle Contract
//!
//! Generic convergence engine shared by every managed resource kind.
//!
//! ## Overview
//!
//! A resource instance is reconciled in passes. Each pass:
//!
//! 1. **probe** reads observed state (no side effects beyond a per-pass cache)
//! 2. **diff** compares desired against observed with semantic comparators
//! 3. **plan** picks exactly one action: create, destroy, flush or nothing
//! 4. **apply** runs that action; flush receives the whole batch of drifted
//!    properties so one pass produces at most one rewrite or remote round trip
//!
//! Resource kinds plug in through [`ResourceStrategy`]; the engine itself is
//! [`Convergence`].
//!
//! ## Key Components
//!
//! - [`Convergence`]: per-instance driver returning a [`PassReport`]
//! - [`planner::plan`]: pure action selection
//! - [`ChangeSet`]: batched property differences
//! - [`Clock`]: injected time source
//! - [`persist`]: atomic private-file writes

#![deny(unsafe_code)]

pub mod changeset;
pub mod clock;
pub mod engine;
pub mod error;
pub mod persist;
pub mod planner;
pub mod resource;

pub use changeset::{ChangeSet, PropertyChange};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{Convergence, PassReport};
pub use error::{ConvergeError, ConvergeResult};
pub use persist::FileOwnership;
pub use planner::Action;
pub use resource::{Applied, Ensure, ResourceStrategy};
