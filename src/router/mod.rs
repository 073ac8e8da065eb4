//! UTD routing.
//!
//! Routes are registered against a UTD pattern and resolved in
//! registration order: the first route whose scheme, host, and path match
//! wins. Scheme and host compare case-insensitively; host and path
//! segments written `{name}` capture variables.

mod pattern;

pub use pattern::{Pattern, Vars};

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::task::{Params, Request, Task, TaskResult};
use crate::utd::{self, Utd, WILDCARD};

const SLASH_WILDCARD: &str = "/*";

/// An individual route.
pub struct Route {
    task: Arc<dyn Task>,
    scheme: String,
    host: String,
    paths: Vec<Pattern>,
}

impl Route {
    /// Append additional path patterns to this route.
    pub fn paths(&mut self, patterns: &[&str]) -> &mut Self {
        self.paths.extend(patterns.iter().map(|p| Pattern::parse(p)));
        self
    }

    fn matches(&self, utd: &Utd) -> Option<Vars> {
        if !self.scheme.eq_ignore_ascii_case(utd.scheme()) {
            return None;
        }

        let mut host_vars = Vars::new();
        if self.host == WILDCARD {
            return Some(Vars::new());
        } else if self.host.len() > 2 && self.host.starts_with('{') && self.host.ends_with('}') {
            host_vars.insert(
                self.host[1..self.host.len() - 1].trim().to_string(),
                utd.host().to_string(),
            );
        } else if !self.host.eq_ignore_ascii_case(utd.host()) {
            return None;
        }

        if self.paths.is_empty() {
            return Some(host_vars); // no paths to match, we must succeed
        }
        for pattern in &self.paths {
            if pattern.is_wildcard() {
                return Some(Vars::new());
            }
            if let Some(path_vars) = pattern.matches(utd.path()) {
                // path captures win over a host capture of the same name
                let mut merged = host_vars.clone();
                merged.extend(path_vars);
                return Some(merged);
            }
        }

        None
    }

    pub async fn exec(
        &self,
        cancel: CancellationToken,
        req: Request,
        params: Params,
    ) -> Result<TaskResult> {
        self.task.exec(cancel, req, params).await
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if !self.host.is_empty() {
            write!(f, "//{}", self.host)?;
        }
        match self.paths.len() {
            0 => {
                if self.host != WILDCARD {
                    f.write_str(SLASH_WILDCARD)?;
                }
            }
            1 => write!(f, "{}", self.paths[0])?,
            _ => {
                f.write_str("{")?;
                for (n, p) in self.paths.iter().enumerate() {
                    if n > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str("}")?;
            }
        }
        Ok(())
    }
}

/// Resolves UTDs to registered routes.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route for a pattern. A path of `*` or `/*` registers a
    /// scheme-and-host wildcard.
    pub fn add(&mut self, pattern: &str, task: Arc<dyn Task>) -> &mut Route {
        let (scheme, host, path) = utd::split(pattern);
        let paths = if path == WILDCARD || path == SLASH_WILDCARD {
            Vec::new()
        } else {
            vec![Pattern::parse(&path)]
        };
        self.routes.push(Route {
            task,
            scheme,
            host,
            paths,
        });
        self.routes.last_mut().expect("route just pushed")
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve a UTD to the first matching route and its captured
    /// variables. No match is not an error here; [`Router::exec`] converts
    /// it to one.
    pub fn find(&self, utd: &Utd) -> Option<(&Route, Vars)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(utd).map(|vars| (route, vars)))
    }

    /// Resolve and invoke the task registered for the request's UTD.
    pub async fn exec(&self, cancel: CancellationToken, req: Request) -> Result<TaskResult> {
        match self.find(&req.utd) {
            None => Err(Error::Unsupported(req.utd.to_string())),
            Some((route, vars)) => route.exec(cancel, req, Params { vars }).await,
        }
    }
}
