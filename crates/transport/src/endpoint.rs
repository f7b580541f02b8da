//! Request clients and the endpoint loop that feeds a handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Correlated;
use common::messages::Rejected;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{HandlerError, TransportError};

/// Requests buffered per endpoint before senders wait.
const INBOX_CAPACITY: usize = 64;

/// What a requester receives: the response, or an explicit rejection.
pub type Reply<T> = Result<T, Rejected>;

/// Handles one request type for an endpoint.
///
/// A responder serving several message types implements this trait once per
/// type and is mounted once per type with [`serve`].
#[async_trait]
pub trait Handler<M>: Send + Sync + 'static
where
    M: Send + 'static,
{
    type Response: Send + 'static;

    async fn handle(&self, message: M) -> Result<Self::Response, HandlerError>;
}

struct Envelope<M, R> {
    message: M,
    reply_to: oneshot::Sender<Reply<R>>,
}

/// Sending half of an endpoint.
///
/// Every request carries its own reply handle, so concurrent requests never
/// share completion state.
pub struct RequestClient<M, R> {
    endpoint: &'static str,
    sender: mpsc::Sender<Envelope<M, R>>,
}

impl<M, R> Clone for RequestClient<M, R> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint,
            sender: self.sender.clone(),
        }
    }
}

impl<M, R> std::fmt::Debug for RequestClient<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl<M, R> RequestClient<M, R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    /// Returns the endpoint name this client sends to.
    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// Sends a request and waits for its reply.
    ///
    /// Unbounded: callers that need a deadline use [`request_within`] or
    /// wrap the call in their own timeout.
    ///
    /// [`request_within`]: RequestClient::request_within
    pub async fn request(&self, message: M) -> Result<Reply<R>, TransportError> {
        let (reply_to, reply) = oneshot::channel();
        self.sender
            .send(Envelope { message, reply_to })
            .await
            .map_err(|_| TransportError::Closed {
                endpoint: self.endpoint,
            })?;

        reply.await.map_err(|_| TransportError::NoReply {
            endpoint: self.endpoint,
        })
    }

    /// Sends a request and waits at most `timeout` for its reply.
    ///
    /// Expiry abandons this request only; the handler may still complete it.
    pub async fn request_within(
        &self,
        message: M,
        timeout: Duration,
    ) -> Result<Reply<R>, TransportError> {
        tokio::time::timeout(timeout, self.request(message))
            .await
            .map_err(|_| TransportError::TimedOut {
                endpoint: self.endpoint,
                after: timeout,
            })?
    }
}

/// Handle to a running endpoint loop.
#[derive(Debug)]
pub struct EndpointHandle {
    endpoint: &'static str,
    task: JoinHandle<()>,
}

impl EndpointHandle {
    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// Stops the endpoint. In-flight requests are dropped without a reply.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    /// Waits for the loop to finish, which happens once every client is gone.
    pub async fn join(self) {
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            tracing::error!(endpoint = self.endpoint, error = %e, "endpoint loop panicked");
        }
    }
}

/// Mounts `handler` for message type `M` and returns a client for it.
///
/// Requests are handled concurrently. The loop owns every in-flight handler
/// task and drains them before exiting.
pub fn serve<M, H>(
    endpoint: &'static str,
    handler: Arc<H>,
) -> (RequestClient<M, H::Response>, EndpointHandle)
where
    M: Correlated + Send + 'static,
    H: Handler<M>,
{
    let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
    let task = tokio::spawn(run(endpoint, handler, inbox));

    (
        RequestClient { endpoint, sender },
        EndpointHandle { endpoint, task },
    )
}

async fn run<M, H>(
    endpoint: &'static str,
    handler: Arc<H>,
    mut inbox: mpsc::Receiver<Envelope<M, H::Response>>,
) where
    M: Correlated + Send + 'static,
    H: Handler<M>,
{
    let mut in_flight = JoinSet::new();
    tracing::debug!(endpoint, "endpoint started");

    loop {
        tokio::select! {
            envelope = inbox.recv() => match envelope {
                Some(envelope) => {
                    in_flight.spawn(deliver(endpoint, Arc::clone(&handler), envelope));
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(endpoint, joined);
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        log_join(endpoint, joined);
    }
    tracing::debug!(endpoint, "endpoint stopped");
}

async fn deliver<M, H>(endpoint: &'static str, handler: Arc<H>, envelope: Envelope<M, H::Response>)
where
    M: Correlated + Send + 'static,
    H: Handler<M>,
{
    let Envelope { message, reply_to } = envelope;
    let correlation_id = message.correlation_id();

    let reply = match handler.handle(message).await {
        Ok(response) => Ok(response),
        Err(HandlerError::Rejected(reason)) => {
            tracing::info!(endpoint, %correlation_id, %reason, "request rejected");
            Err(Rejected {
                correlation_id,
                reason,
            })
        }
        Err(HandlerError::Unprocessed(reason)) => {
            tracing::warn!(endpoint, %correlation_id, %reason, "request left for redelivery");
            return;
        }
    };

    if reply_to.send(reply).is_err() {
        tracing::debug!(endpoint, %correlation_id, "requester gone before reply");
    }
}

fn log_join(endpoint: &'static str, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        tracing::error!(endpoint, error = %e, "request handler panicked");
    }
}
