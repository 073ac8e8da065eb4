//! Executor configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::queue::Queue;
use crate::worklog::Worklog;

#[derive(Clone, Default)]
pub struct Config {
    pub queue: Option<Arc<Queue>>,
    pub worklog: Option<Arc<dyn Worklog>>,
    /// The broker subscription to consume from.
    pub subscription: String,
    /// Maximum concurrently-executing handlers; clamped to at least 1.
    pub concurrency: usize,
    /// How long non-terminal entries are valid until they expire; clamped
    /// to at least a minute.
    pub entry_ttl: Duration,
    /// Defaults to the OS host name.
    pub nodename: Option<String>,
    pub verbose: bool,
    pub debug: bool,
}

impl Config {
    /// Apply options left-to-right over this config.
    pub fn with_options(self, opts: Vec<ConfigOption>) -> Self {
        opts.into_iter().fold(self, |conf, opt| opt(conf))
    }
}

pub type ConfigOption = Box<dyn FnOnce(Config) -> Config + Send>;

pub fn with_queue(queue: Arc<Queue>) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.queue = Some(queue);
        conf
    })
}

pub fn with_worklog(worklog: Arc<dyn Worklog>) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.worklog = Some(worklog);
        conf
    })
}

pub fn with_subscription(name: impl Into<String>) -> ConfigOption {
    let name = name.into();
    Box::new(move |mut conf| {
        conf.subscription = name;
        conf
    })
}

pub fn with_concurrency(n: usize) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.concurrency = n;
        conf
    })
}

pub fn with_entry_ttl(ttl: Duration) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.entry_ttl = ttl;
        conf
    })
}

pub fn with_nodename(name: impl Into<String>) -> ConfigOption {
    let name = name.into();
    Box::new(move |mut conf| {
        conf.nodename = Some(name);
        conf
    })
}

pub fn with_verbose(enabled: bool) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.verbose = enabled;
        conf
    })
}

pub fn with_debug(enabled: bool) -> ConfigOption {
    Box::new(move |mut conf| {
        conf.debug = enabled;
        conf
    })
}
