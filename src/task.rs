//! The task capability.
//!
//! A task is anything that can be executed for a request. Handlers
//! implement [`Task`] directly or wrap a closure in [`TaskFunc`].

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::router::Vars;
use crate::transport::b64;
use crate::utd::Utd;

/// The per-invocation run identifier: `<node>:<n>`.
pub fn run_id(node: &str, run: u64) -> String {
    format!("{node}:{run}")
}

/// A single task invocation.
#[derive(Debug, Clone)]
pub struct Request {
    /// The execution run identifier.
    pub run: String,
    pub utd: Utd,
    /// The task payload.
    pub entity: Vec<u8>,
}

impl Request {
    pub fn new(utd: Utd) -> Self {
        Self {
            run: String::new(),
            utd,
            entity: Vec::new(),
        }
    }

    pub fn with_run(mut self, node: &str, run: u64) -> Self {
        self.run = run_id(node, run);
        self
    }

    pub fn with_entity(mut self, data: Vec<u8>) -> Self {
        self.entity = data;
        self
    }
}

/// What a handler produced: opaque state recorded alongside the outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, with = "b64")]
    pub state: Vec<u8>,
}

impl TaskResult {
    pub fn with_state(state: Vec<u8>) -> Self {
        Self { state }
    }
}

/// Variables captured while resolving the request's UTD.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub vars: Vars,
}

#[async_trait]
pub trait Task: Send + Sync {
    async fn exec(
        &self,
        cancel: CancellationToken,
        req: Request,
        params: Params,
    ) -> Result<TaskResult>;
}

/// Adapts an async closure into a [`Task`].
pub struct TaskFunc<F>(pub F);

#[async_trait]
impl<F, Fut> Task for TaskFunc<F>
where
    F: Fn(CancellationToken, Request, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResult>> + Send,
{
    async fn exec(
        &self,
        cancel: CancellationToken,
        req: Request,
        params: Params,
    ) -> Result<TaskResult> {
        (self.0)(cancel, req, params).await
    }
}
