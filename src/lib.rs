//! # taskq
//!
//! A distributed task-execution control plane. Producers submit units of
//! work addressed by a URI-like descriptor (UTD); consumers pull them from
//! a message queue and execute them on a pool of workers. Managed tasks
//! keep a durable log of attempts — the worklog — so the same task never
//! runs twice concurrently, failures can be retried with state continuity,
//! and long-running tasks hold a renewable lease while they progress.
//!
//! The pieces:
//! - transport: the on-queue message encoding (header and inline forms)
//! - router: UTD pattern matching with variable capture
//! - worklog: the attempt log, its state machine, and storage backends
//! - queue: the broker adapter that seeds pending entries on publish
//! - exec: the executor — concurrent dispatch, leases, panic containment
//! - service: a thin HTTP ingress over the queue and executor

pub mod attrs;
pub mod broker;
pub mod error;
pub mod exec;
pub mod ident;
pub mod metrics;
pub mod queue;
pub mod router;
pub mod service;
pub mod task;
pub mod telemetry;
pub mod transport;
pub mod utd;
pub mod worklog;

pub use error::{Error, Result};
