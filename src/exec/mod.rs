//! The executor: concurrent task dispatch coordinated with the worklog.
//!
//! A single consumer loop pulls deliveries from the queue, acknowledges
//! them immediately, and dispatches each under a bounded-concurrency
//! semaphore. Managed tasks run the worklog protocol: admission against
//! the latest entry, a running entry with a renewable lease, and a
//! terminal entry written on a detached timeout so it lands even when the
//! dispatch context is already canceled.

mod config;

pub use config::{
    with_concurrency, with_debug, with_entry_ttl, with_nodename, with_queue, with_subscription,
    with_verbose, with_worklog, Config, ConfigOption,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use opentelemetry::KeyValue;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::metrics;
use crate::queue::Queue;
use crate::router::{Route, Router};
use crate::task::{run_id, Request, Task, TaskResult};
use crate::transport::{Kind, Message};
use crate::utd::Utd;
use crate::worklog::{Entry, State, Worklog};

/// The default timeout for operations: the detached terminal write and
/// error-report propagation.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry TTL floor.
const MIN_ENTRY_TTL: Duration = Duration::from_secs(60);

/// A dispatched task currently executing on this node.
pub struct InflightTask {
    pub cancel: CancellationToken,
    pub message: Message,
    pub entry: Entry,
}

pub struct Executor {
    router: Arc<Router>,
    queue: Arc<Queue>,
    worklog: Option<Arc<dyn Worklog>>,
    subscription: String,
    nodename: String,
    concurrency: usize,
    ttl: Duration,
    verbose: bool,
    debug: bool,
    runid: AtomicU64,
    inflight: DashMap<String, InflightTask>,
    reporter: Mutex<Option<mpsc::Sender<Error>>>,
}

impl Executor {
    pub fn new(queue: Arc<Queue>, subscription: &str, opts: Vec<ConfigOption>) -> Result<Self> {
        Self::with_config(
            Config {
                queue: Some(queue),
                subscription: subscription.to_string(),
                ..Config::default()
            }
            .with_options(opts),
        )
    }

    pub fn with_config(conf: Config) -> Result<Self> {
        let queue = conf
            .queue
            .ok_or_else(|| Error::InvalidConfig("no queue provided".to_string()))?;
        if conf.subscription.is_empty() {
            return Err(Error::InvalidConfig("no subscription provided".to_string()));
        }

        let nodename = match conf.nodename {
            Some(name) => name,
            None => hostname::get()
                .map_err(|err| {
                    Error::InvalidConfig(format!(
                        "no node name provided and could not obtain host name: {err}"
                    ))
                })?
                .to_string_lossy()
                .into_owned(),
        };

        let verbose = conf.verbose || env_flag(&["VERBOSE_WORKER", "VERBOSE"]);
        let debug = conf.debug || env_flag(&["DEBUG_WORKER", "DEBUG"]);

        Ok(Self {
            router: Arc::new(Router::new()),
            worklog: conf.worklog.or_else(|| queue.worklog().cloned()),
            queue,
            subscription: conf.subscription,
            nodename,
            concurrency: conf.concurrency.max(1),
            ttl: conf.entry_ttl.max(MIN_ENTRY_TTL),
            verbose,
            debug,
            runid: AtomicU64::new(0),
            inflight: DashMap::new(),
            reporter: Mutex::new(None),
        })
    }

    /// Register a route. Routes are added before the executor is shared
    /// and started; registering afterwards panics.
    pub fn add(&mut self, pattern: &str, task: Arc<dyn Task>) -> &mut Route {
        Arc::get_mut(&mut self.router)
            .expect("routes must be registered before the executor is shared")
            .add(pattern, task)
    }

    pub fn router(&self) -> &Router {
        self.router.as_ref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose || self.debug
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Number of tasks currently executing on this node.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Cancel a managed task executing on this node. Returns false when
    /// the task is not in flight here.
    pub fn cancel_task(&self, task_id: Ident) -> bool {
        match self.inflight.get(&task_id.to_string()) {
            Some(spec) => {
                spec.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Attach a receiver for task errors. Without one, errors are logged;
    /// with one, each error is offered for up to ten seconds and then
    /// dropped with a log line.
    pub fn errors(&self) -> mpsc::Receiver<Error> {
        let (tx, rx) = mpsc::channel(1);
        if let Ok(mut reporter) = self.reporter.lock() {
            *reporter = Some(tx);
        }
        rx
    }

    async fn report(&self, err: Error) {
        let reporter = match self.reporter.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match reporter {
            None => error!(cause = %err, "error processing task"),
            Some(tx) => match tx.send_timeout(err, DEFAULT_TIMEOUT).await {
                Ok(()) => {} // error propagated to the receiver
                Err(mpsc::error::SendTimeoutError::Timeout(err)) => {
                    error!(cause = %err, "timeout while propagating error; moving on");
                }
                Err(mpsc::error::SendTimeoutError::Closed(err)) => {
                    error!(cause = %err, "error receiver dropped");
                }
            },
        }
    }

    fn next_run(&self) -> String {
        let n = self.runid.fetch_add(1, Ordering::Relaxed) + 1;
        run_id(&self.nodename, n)
    }

    /// Run the consumer loop until the token cancels or the queue closes,
    /// then wait for in-flight tasks and return [`Error::Stopped`].
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut recv = self
            .queue
            .consume(cancel.child_token(), &self.subscription)
            .await?;
        let mut total: u64 = 0;

        loop {
            let dlv = tokio::select! {
                _ = cancel.cancelled() => break,
                dlv = recv.recv() => match dlv {
                    Some(dlv) => dlv,
                    None => break,
                },
            };

            let msg = match dlv.message() {
                Ok(msg) => msg,
                Err(err) => {
                    self.report(err).await;
                    continue;
                }
            };

            // ack immediately to avoid repeated delivery; if this message is
            // managed, the pending state should already be recorded in the
            // worklog and the task may be retried from there should
            // execution fail
            dlv.ack().await;

            total += 1;
            if self.verbose() {
                info!(
                    utd = %msg.utd,
                    task_id = %msg.id,
                    task_kind = %msg.kind,
                    data_len = msg.data.len(),
                    total,
                    in_flight = self.in_flight(),
                    "received task"
                );
            }

            let Ok(permit) = sem.clone().acquire_owned().await else {
                break;
            };
            let this = Arc::clone(&self);
            let task_cancel = cancel.child_token();
            tokio::spawn(async move {
                let _permit = permit;
                this.dispatch(task_cancel, msg).await;
            });
        }

        info!(
            in_flight = self.in_flight(),
            "waiting for in-flight tasks to complete"
        );
        let _ = sem.acquire_many(self.concurrency as u32).await;
        Err(Error::Stopped)
    }

    async fn dispatch(&self, cancel: CancellationToken, msg: Message) {
        let now = Utc::now();
        let kind = msg.kind;
        let utd = msg.utd.clone();
        let task_id = msg.id;

        let res = match kind {
            Kind::Managed => self.handle_managed(cancel, &msg, now).await,
            Kind::Oneshot => self.handle_oneshot(cancel, &msg).await,
            Kind::Cronjob => self.handle_cronjob(cancel, msg, now).await,
        };

        if let Err(err) = res {
            // oneshot failures are merely logged; managed failures page
            error!(
                utd = %utd,
                task_id = %task_id,
                task_kind = %kind,
                cause = %err,
                alert = kind != Kind::Oneshot,
                "task failed"
            );
            self.report(err).await;
        }
    }

    async fn handle_oneshot(&self, cancel: CancellationToken, msg: &Message) -> Result<()> {
        self.process(cancel, msg, None).await.map(|_| ())
    }

    /// A cronjob message is a managed task that isn't fully initialized
    /// because the scheduler enqueued it directly: it has no identifier
    /// until we assign one, and no pending entry until we seed one.
    async fn handle_cronjob(
        &self,
        cancel: CancellationToken,
        mut msg: Message,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let worklog = self.worklog.clone().ok_or_else(|| {
            Error::Unsupported("worklog is not available, cannot manage tasks".to_string())
        })?;

        if msg.id.is_zero() {
            msg.id = Ident::new();
        }

        let entry = Entry::new(msg.id, msg.utd.clone(), State::Pending, now);
        match worklog.create_entry(&entry).await {
            Ok(()) => {}
            // the tolerated error here is suspect; see the pinned test on
            // cronjob redelivery before changing it
            Err(Error::NotFound(_)) => {}
            Err(err) => {
                return Err(Error::Other(format!(
                    "could not initialize worklog entry: {err}"
                )));
            }
        }

        self.handle_managed(cancel, &msg, now).await
    }

    async fn handle_managed(
        &self,
        cancel: CancellationToken,
        msg: &Message,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let worklog = self.worklog.clone().ok_or_else(|| {
            Error::Unsupported("worklog is not available, cannot manage tasks".to_string())
        })?;
        if msg.id.is_zero() {
            return Err(Error::MissingIdent);
        }

        let prior = match worklog.fetch_latest_entry_for_task(msg.id).await {
            Ok(entry) => Some(entry),
            Err(Error::NotFound(_)) => None,
            Err(err) => {
                return Err(Error::Other(format!(
                    "could not fetch worklog entry: {err}"
                )));
            }
        };

        let next = match &prior {
            Some(entry) => {
                if entry.state == State::Complete {
                    return Err(Error::Other("task is already completed".to_string()));
                } else if entry.state == State::Running && entry.valid(now) {
                    return Err(Error::Other(format!(
                        "task is already running since: {}",
                        entry.created
                    )));
                }
                entry.next_with_attrs(State::Running, msg.data.clone(), msg.attrs.clone())
            }
            None => Entry::new(msg.id, msg.utd.clone(), State::Running, now)
                .data(msg.data.clone())
                .attrs(msg.attrs.clone().unwrap_or_default()),
        };

        if let Err(err) = worklog.store_entry(&next).await {
            return Err(match &prior {
                Some(prior) => Error::Other(format!(
                    "could not store worklog entry on run ({} -> {}): {err}",
                    prior.task_seq, next.task_seq
                )),
                None => Error::Other(format!("could not store worklog entry on init: {err}")),
            });
        }

        let task_id = next.task_id.to_string();
        let task_cancel = cancel.child_token();
        self.inflight.insert(
            task_id.clone(),
            InflightTask {
                cancel: task_cancel.clone(),
                message: msg.clone(),
                entry: next.clone(),
            },
        );

        let res = self.process(task_cancel.clone(), msg, Some(&next)).await;

        task_cancel.cancel();
        self.inflight.remove(&task_id);

        let terminal = match &res {
            Ok(result) => next.next(State::Complete, result.state.clone()),
            Err(err) => next
                .next(state_for_error(err), Vec::new())
                .retry(err.is_recoverable())
                .error(serde_json::json!({ "message": err.to_string() })),
        };

        // the dispatch context may already be canceled or timed out; the
        // terminal write must still land, so it runs detached under its
        // own timeout
        match tokio::time::timeout(DEFAULT_TIMEOUT, worklog.store_entry(&terminal)).await {
            Ok(Ok(())) => {}
            Ok(Err(suberr)) => {
                error!(
                    utd = %msg.utd,
                    task_id = %msg.id,
                    task_seq = terminal.task_seq,
                    cause = %suberr,
                    alert = true,
                    "could not store terminal worklog entry"
                );
            }
            Err(_) => {
                error!(
                    utd = %msg.utd,
                    task_id = %msg.id,
                    task_seq = terminal.task_seq,
                    alert = true,
                    "timed out storing terminal worklog entry"
                );
            }
        }

        res.map(|_| ())
    }

    /// Resolve the message's UTD and invoke its handler, holding a
    /// renewable lease on `entry` for the duration. This is also the
    /// synchronous execution path used by the ingress service.
    pub async fn process(
        &self,
        cancel: CancellationToken,
        msg: &Message,
        entry: Option<&Entry>,
    ) -> Result<TaskResult> {
        let started = Instant::now();
        if self.verbose() {
            match entry {
                Some(entry) => info!(utd = %msg.utd, task_id = %msg.id, worklog = %entry, "running task"),
                None => info!(utd = %msg.utd, task_id = %msg.id, "running task"),
            }
        }

        let utd = Utd::parse(&msg.utd)
            .map_err(|err| Error::Malformed(format!("invalid UTD: {err}")))?;

        let cancel = cancel.child_token();
        let _guard = cancel.clone().drop_guard();

        if let (Some(entry), Some(worklog)) = (entry, self.worklog.clone()) {
            let mut lease = entry.clone();
            let ttl = self.ttl;
            let renew_cancel = cancel.clone();
            let chatty = self.verbose();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = renew_cancel.cancelled() => return,
                        _ = tokio::time::sleep(ttl / 2) => {
                            if chatty {
                                debug!(entry = %lease, window = ?ttl, "renew lease");
                            }
                            match worklog.renew_entry(&lease, Utc::now() + ttl).await {
                                Ok(renewed) => lease = renewed,
                                Err(err) => {
                                    // non-fatal: the admission check resolves
                                    // any takeover race if the lease lapses
                                    error!(
                                        entry = %lease,
                                        cause = %err,
                                        alert = true,
                                        "could not renew worklog entry"
                                    );
                                }
                            }
                        }
                    }
                }
            });
        }

        // the handler runs in its own task so a panic is contained to it
        let router = Arc::clone(&self.router);
        let req = Request {
            run: self.next_run(),
            utd,
            entity: msg.data.clone(),
        };
        let child = cancel.clone();
        let handle = tokio::spawn(async move { router.exec(child, req).await });
        let res = match handle.await {
            Ok(res) => res,
            Err(join) if join.is_panic() => Err(Error::Panic(panic_text(join.into_panic()))),
            Err(_) => Err(Error::Canceled),
        };

        metrics::task_exec_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("task_kind", msg.kind.as_str())],
        );

        match res {
            Ok(result) => {
                metrics::task_success().add(1, &[]);
                if self.verbose() {
                    debug!(utd = %msg.utd, duration = ?started.elapsed(), "task completed");
                }
                Ok(result)
            }
            Err(err) => {
                metrics::task_failure().add(1, &[]);
                match err {
                    Error::Unsupported(_) => Err(err),
                    err if err.is_canceled() => Err(err),
                    err => Err(Error::Handler(Box::new(err))),
                }
            }
        }
    }
}

/// Classify a handler error as a terminal state: cancellations resolve to
/// `Canceled`, everything else to `Failed`.
fn state_for_error(err: &Error) -> State {
    if err.is_canceled() {
        State::Canceled
    } else {
        State::Failed
    }
}

fn env_flag(names: &[&str]) -> bool {
    names
        .iter()
        .any(|name| std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false))
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(text) => (*text).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
