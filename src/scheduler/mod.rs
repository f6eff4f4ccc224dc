//! The scheduler engine.
//!
//! A single task owns the ordered schedule and arms one timer for the
//! earliest fire. External mutation happens only through the
//! [`SchedulerHandle`] channels; the entry list itself is never shared.
//!
//! # Components
//!
//! - [`job`]: the persisted [`JobDefinition`](job::JobDefinition) and the
//!   ephemeral [`JobRun`](job::JobRun)
//! - [`entries`]: the `(next_run, id)`-ordered entry list
//! - [`manager`]: the select loop (timer | add | remove | stop)

pub mod entries;
pub mod job;
pub mod manager;

pub use job::{JobDefinition, JobId, JobRun, RunState};
pub use manager::{Scheduler, SchedulerHandle};
