//! Context transport: isolated request handlers reachable through ports.
//!
//! Each context runs as its own task and owns its state. Other contexts talk
//! to it only through a [`Port`], which guarantees exactly one [`Response`]
//! per request, even when the handler fails or the context is gone.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{Payload, Request, Response};

/// Name of the context that owns the model
pub const BACKGROUND: &str = "background";
/// Name of the context that can read the page
pub const CONTENT: &str = "content";

/// Capacity of a context's request queue
const QUEUE_SIZE: usize = 64;

/// Serves requests inside one context
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle one request. Errors are converted into failure responses.
    async fn handle(&self, request: Request) -> Result<Payload>;
}

/// The error a handler returns for request types it does not serve
pub fn unsupported(request: &Request) -> Error {
    Error::UnknownRequestType(request.type_name().to_string())
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// A cloneable sending handle to a context
#[derive(Clone)]
pub struct Port {
    name: Arc<str>,
    tx: mpsc::Sender<Envelope>,
}

impl Port {
    /// Name of the context behind this port
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request and wait for its response.
    ///
    /// Never fails: transport problems come back as failure responses.
    pub async fn send(&self, request: Request) -> Response {
        let (reply, reply_rx) = oneshot::channel();
        let type_name = request.type_name();

        if self.tx.send(Envelope { request, reply }).await.is_err() {
            tracing::debug!("{} request to closed context {}", type_name, self.name);
            return Response::failure(&Error::Disconnected(self.name.to_string()));
        }

        match reply_rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!("Context {} dropped {} without answering", self.name, type_name);
                Response::failure(&Error::Disconnected(self.name.to_string()))
            }
        }
    }
}

/// Spawn a context serving `handler` and return its port.
///
/// Requests are handled concurrently, each on its own task, so a slow
/// generation never holds up a status query. The context stops once every
/// port clone is dropped.
pub fn spawn_context(name: &str, handler: Arc<dyn Handler>) -> (Port, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_SIZE);
    let name: Arc<str> = Arc::from(name);
    let context = name.clone();

    let task = tokio::spawn(async move {
        tracing::debug!("Context {} started", context);
        while let Some(Envelope { request, reply }) = rx.recv().await {
            let handler = handler.clone();
            let context = context.clone();
            tokio::spawn(async move {
                let type_name = request.type_name();
                let response: Response = handler.handle(request).await.into();
                if let Some(error) = response.error_message() {
                    tracing::debug!("{} {} failed: {}", context, type_name, error);
                }
                if reply.send(response).is_err() {
                    tracing::trace!("Caller of {} {} went away", context, type_name);
                }
            });
        }
        tracing::debug!("Context {} stopped", context);
    });

    (Port { name, tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, request: Request) -> Result<Payload> {
            match request {
                Request::GenerateText { prompt, .. } => Ok(Payload::Generated { response: prompt }),
                other => Err(unsupported(&other)),
            }
        }
    }

    struct Gated {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Handler for Gated {
        async fn handle(&self, request: Request) -> Result<Payload> {
            match request {
                Request::GenerateText { prompt, .. } => {
                    self.gate.notified().await;
                    Ok(Payload::Generated { response: prompt })
                }
                Request::GetPageContent => Ok(Payload::PageContent {
                    content: "fast".into(),
                }),
                other => Err(unsupported(&other)),
            }
        }
    }

    struct Panics;

    #[async_trait]
    impl Handler for Panics {
        async fn handle(&self, _request: Request) -> Result<Payload> {
            panic!("handler bug")
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (port, _task) = spawn_context("echo", Arc::new(Echo));
        let resp = port
            .send(Request::GenerateText {
                prompt: "hello".into(),
                max_tokens: None,
            })
            .await;
        assert_eq!(resp.generated_text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_unsupported_type_is_failure_response() {
        let (port, _task) = spawn_context("echo", Arc::new(Echo));
        let resp = port.send(Request::GetSelection).await;
        assert!(!resp.success);
        assert_eq!(resp.error_message(), Some("Unknown message type: GET_SELECTION"));
    }

    #[tokio::test]
    async fn test_closed_context_answers_with_failure() {
        let (port, task) = spawn_context("gone", Arc::new(Echo));
        task.abort();
        let _ = task.await;

        let resp = port.send(Request::LoadModel).await;
        assert!(!resp.success);
        assert_eq!(resp.error_message(), Some("Context 'gone' is not available"));
    }

    #[tokio::test]
    async fn test_panicking_handler_still_answers() {
        let (port, _task) = spawn_context("buggy", Arc::new(Panics));
        let resp = port.send(Request::LoadModel).await;
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn test_slow_request_does_not_block_others() {
        let gate = Arc::new(Notify::new());
        let (port, _task) = spawn_context("gated", Arc::new(Gated { gate: gate.clone() }));

        let slow_port = port.clone();
        let slow = tokio::spawn(async move {
            slow_port
                .send(Request::GenerateText {
                    prompt: "slow".into(),
                    max_tokens: None,
                })
                .await
        });

        let fast = port.send(Request::GetPageContent).await;
        assert!(fast.success);
        assert!(!slow.is_finished());

        gate.notify_one();
        let slow = slow.await.unwrap();
        assert_eq!(slow.generated_text(), Some("slow"));
    }
}
