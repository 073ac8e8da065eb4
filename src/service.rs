//! HTTP ingress.
//!
//! A thin surface over the queue and executor: health, asynchronous
//! publish, and synchronous execution. Authentication middleware is
//! expected to be layered on by the embedding application.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::exec::Executor;
use crate::queue::{use_config, PublishConfig, Queue};
use crate::transport::Message;

#[derive(Clone, Default)]
pub struct ServiceConfig {
    /// Listen address, e.g. `127.0.0.1:8080`.
    pub addr: String,
    /// Optional URL prefix for every route.
    pub prefix: String,
    pub queue: Option<Arc<Queue>>,
    pub exec: Option<Arc<Executor>>,
}

#[derive(Clone)]
struct AppState {
    queue: Option<Arc<Queue>>,
    exec: Option<Arc<Executor>>,
}

pub struct Service {
    addr: String,
    router: axum::Router,
}

impl Service {
    pub fn with_config(conf: ServiceConfig) -> Self {
        let state = AppState {
            queue: conf.queue,
            exec: conf.exec,
        };
        let routes = axum::Router::new()
            // health check
            .route("/status", get(handle_status))
            // submit a task to the queue for normal scheduling
            .route("/v1/queue", post(handle_write_queue))
            // execute a task synchronously on the local executor; intended
            // for testing scenarios
            .route("/v1/tasks", post(handle_exec_task))
            .with_state(state);

        let router = if conf.prefix.is_empty() {
            routes
        } else {
            axum::Router::new().nest(&conf.prefix, routes)
        };

        Self {
            addr: conf.addr,
            router,
        }
    }

    /// The route table, for embedding or driving in tests.
    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    /// Serve until the token cancels.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!(addr = %self.addr, "task service listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn handle_status() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_write_queue(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    payload: std::result::Result<Json<Message>, JsonRejection>,
) -> Response {
    let Some(queue) = state.queue else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "task queue is not available",
        );
    };

    let conf = match PublishConfig::from_params(&params) {
        Ok(conf) => conf,
        Err(err) => return failure(StatusCode::BAD_REQUEST, format!("invalid parameters: {err}")),
    };

    let Json(mut msg) = match payload {
        Ok(json) => json,
        Err(err) => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("could not unmarshal entity: {err}"),
            );
        }
    };
    if msg.utd.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "task UTD is required");
    }

    info!(utd = %msg.utd, data_len = msg.data.len(), "publish task");
    match queue.publish(&mut msg, vec![use_config(conf)]).await {
        Ok(()) => Json(msg).into_response(),
        Err(err) => failure(
            StatusCode::BAD_GATEWAY,
            format!("could not publish task: {err}"),
        ),
    }
}

async fn handle_exec_task(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Message>, JsonRejection>,
) -> Response {
    let Some(exec) = state.exec else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "task executor is not available",
        );
    };

    let Json(msg) = match payload {
        Ok(json) => json,
        Err(err) => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("could not unmarshal entity: {err}"),
            );
        }
    };
    if msg.utd.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "task UTD is required");
    }

    info!(utd = %msg.utd, data_len = msg.data.len(), "execute task (synchronous)");
    match exec.process(CancellationToken::new(), &msg, None).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => failure(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}
