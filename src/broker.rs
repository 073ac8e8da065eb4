//! The pull-broker seam.
//!
//! The control plane assumes any pull-based broker: something that accepts
//! an [`Envelope`] and later hands it back through a named subscription.
//! Production bindings live outside this crate; [`MemoryBroker`] covers
//! tests and single-process runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::attrs::Attributes;
use crate::error::{Error, Result};

/// A broker-level message: opaque payload plus string attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub attributes: Attributes,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Open a named subscription.
    fn consumer(&self, name: &str) -> Result<Arc<dyn Consumer>>;
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Receive the next delivery, waiting at most `timeout`. Expiry is
    /// `Error::Timeout`; a shut-down broker is `Error::Closed`.
    async fn receive(&self, timeout: Duration) -> Result<Box<dyn BrokerDelivery>>;
}

/// A single delivery leased from the broker until acked or nacked.
#[async_trait]
pub trait BrokerDelivery: Send + Sync {
    fn envelope(&self) -> &Envelope;

    async fn ack(&self);

    /// Return the delivery for redelivery.
    async fn nack(&self);
}

struct MemoryState {
    queue: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    closed: AtomicBool,
    acked: AtomicUsize,
}

/// In-process broker: a single FIFO shared by every subscription.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<MemoryState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                acked: AtomicUsize::new(0),
            }),
        }
    }

    /// Shut down: pending and future receives observe `Error::Closed` once
    /// the queue drains.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Number of deliveries acknowledged so far.
    pub fn acked(&self) -> usize {
        self.state.acked.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.state.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, env: Envelope) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.state
            .queue
            .lock()
            .map_err(|_| Error::Storage("queue lock poisoned".to_string()))?
            .push_back(env);
        self.state.notify.notify_one();
        Ok(())
    }

    fn consumer(&self, _name: &str) -> Result<Arc<dyn Consumer>> {
        Ok(Arc::new(MemoryConsumer {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConsumer {
    state: Arc<MemoryState>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn receive(&self, timeout: Duration) -> Result<Box<dyn BrokerDelivery>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // register for wakeup before checking the queue, else a publish
            // between the check and the wait is lost until the timeout
            let notified = self.state.notify.notified();

            let popped = self
                .state
                .queue
                .lock()
                .map_err(|_| Error::Storage("queue lock poisoned".to_string()))?
                .pop_front();
            if let Some(env) = popped {
                return Ok(Box::new(MemoryDelivery {
                    env,
                    state: Arc::clone(&self.state),
                }));
            }
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(Error::Closed);
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Err(Error::Timeout),
            }
        }
    }
}

struct MemoryDelivery {
    env: Envelope,
    state: Arc<MemoryState>,
}

#[async_trait]
impl BrokerDelivery for MemoryDelivery {
    fn envelope(&self) -> &Envelope {
        &self.env
    }

    async fn ack(&self) {
        self.state.acked.fetch_add(1, Ordering::SeqCst);
    }

    async fn nack(&self) {
        if let Ok(mut queue) = self.state.queue.lock() {
            queue.push_back(self.env.clone());
        }
        self.state.notify.notify_one();
    }
}
