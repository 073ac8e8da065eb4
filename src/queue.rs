//! The task queue adapter.
//!
//! Wraps a broker with task semantics: publishing a managed message seeds
//! its pending worklog entry before the broker sees it, and consuming
//! yields parsed deliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, BrokerDelivery};
use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::metrics;
use crate::transport::{Kind, Message};
use crate::worklog::{State, Worklog};

/// How long a single broker receive may block; bounds how quickly the
/// consumer loop observes cancellation.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Options applied to a publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishConfig {
    /// State sequence for the seeded pending entry.
    pub state_seq: i64,
}

impl PublishConfig {
    /// Apply options left-to-right over this config.
    pub fn with_options(self, opts: Vec<PublishOption>) -> Self {
        opts.into_iter().fold(self, |conf, opt| opt(conf))
    }

    /// Read the config out of request query parameters.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut conf = Self::default();
        if let Some(raw) = params.get("state_seq") {
            conf.state_seq = raw
                .parse()
                .map_err(|err| Error::InvalidParameters(format!("state_seq: {err}")))?;
        }
        Ok(conf)
    }

    /// The query-string form of this config, with a leading `?` when
    /// non-empty.
    pub fn query(&self) -> String {
        if self.state_seq != 0 {
            format!("?state_seq={}", self.state_seq)
        } else {
            String::new()
        }
    }
}

pub type PublishOption = Box<dyn FnOnce(PublishConfig) -> PublishConfig + Send>;

pub fn use_config(conf: PublishConfig) -> PublishOption {
    Box::new(move |_| conf)
}

pub fn with_state_seq(seq: i64) -> PublishOption {
    Box::new(move |mut conf| {
        conf.state_seq = seq;
        conf
    })
}

/// A parsed delivery from the broker, or the error that prevented parsing.
pub struct Delivery {
    delivery: Option<Box<dyn BrokerDelivery>>,
    message: Option<Message>,
    err: Option<Error>,
}

impl Delivery {
    fn parsed(delivery: Box<dyn BrokerDelivery>, message: Message) -> Self {
        Self {
            delivery: Some(delivery),
            message: Some(message),
            err: None,
        }
    }

    fn corrupt(delivery: Box<dyn BrokerDelivery>, err: Error) -> Self {
        Self {
            delivery: Some(delivery),
            message: None,
            err: Some(err),
        }
    }

    fn failed(err: Error) -> Self {
        Self {
            delivery: None,
            message: None,
            err: Some(err),
        }
    }

    pub fn message(&self) -> Result<Message> {
        match (&self.message, &self.err) {
            (Some(msg), _) => Ok(msg.clone()),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(Error::InvalidRequest),
        }
    }

    pub async fn ack(&self) {
        if let Some(d) = &self.delivery {
            d.ack().await;
        }
    }

    pub async fn nack(&self) {
        if let Some(d) = &self.delivery {
            d.nack().await;
        }
    }
}

/// A broker bound to task semantics and an optional worklog.
pub struct Queue {
    broker: Arc<dyn Broker>,
    worklog: Option<Arc<dyn Worklog>>,
}

impl Queue {
    pub fn new(broker: Arc<dyn Broker>, worklog: Option<Arc<dyn Worklog>>) -> Self {
        Self { broker, worklog }
    }

    pub fn worklog(&self) -> Option<&Arc<dyn Worklog>> {
        self.worklog.as_ref()
    }

    /// Submit conforms to the publisher capability; it has the same effect
    /// as [`Queue::publish`].
    pub async fn submit(&self, msg: &mut Message, opts: Vec<PublishOption>) -> Result<()> {
        self.publish(msg, opts).await
    }

    /// Publish a message: assign an identifier if absent, seed the pending
    /// worklog entry for managed messages, then enqueue. A worklog failure
    /// aborts the publish; the broker never sees the message.
    pub async fn publish(&self, msg: &mut Message, opts: Vec<PublishOption>) -> Result<()> {
        let conf = PublishConfig::default().with_options(opts);

        if msg.id.is_zero() {
            msg.id = Ident::new();
        }
        let env = msg.encode()?;

        if msg.kind == Kind::Managed {
            if let Some(worklog) = &self.worklog {
                let entry = msg
                    .entry(State::Pending, Utc::now())
                    .task_seq(msg.seq)
                    .state_seq(conf.state_seq);
                if entry.task_seq == 0 {
                    worklog.create_entry(&entry).await?;
                } else {
                    worklog.store_entry(&entry).await?;
                }
            }
        }

        self.broker.publish(env).await?;
        metrics::queue_operations().add(1, &[KeyValue::new("operation", "publish")]);
        Ok(())
    }

    /// Consume deliveries from a named subscription until the token cancels
    /// or the broker closes. Parse failures surface per-delivery without
    /// ending the stream; receive failures other than timeouts end it.
    pub async fn consume(
        &self,
        cancel: CancellationToken,
        name: &str,
    ) -> Result<mpsc::Receiver<Delivery>> {
        let consumer = self.broker.consumer(name)?;
        let (tx, rx) = mpsc::channel(10);

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let delivery = match consumer.receive(RECEIVE_TIMEOUT).await {
                    // the bounded receive exists to observe cancellation
                    // within a reasonable period; just poll again
                    Err(Error::Timeout) => continue,
                    Err(Error::Closed) => return,
                    Err(err) => {
                        let _ = tx.send(Delivery::failed(err)).await;
                        return;
                    }
                    Ok(d) => d,
                };
                metrics::queue_operations().add(1, &[KeyValue::new("operation", "receive")]);

                let parsed = match Message::parse(delivery.envelope()) {
                    Ok(msg) => Delivery::parsed(delivery, msg),
                    Err(err) => Delivery::corrupt(delivery, err),
                };
                if tx.send(parsed).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
