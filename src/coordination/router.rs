//! Request/response routing between execution contexts
//!
//! Each context registers an inbox; the transport delivers envelopes to
//! it over an in-process channel and hands request-style messages a
//! one-shot reply slot. Dispatch inside a context goes through a handler
//! registry keyed on the envelope's type string. A request always
//! resolves: to the handler's response, to a typed error response when
//! the handler fails, or to a timeout error when the target context is
//! gone or too slow.

use crate::coordination::errors::CoordinationError;
use crate::coordination::messages::{ContextId, Envelope, Response};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Deadline for background-to-page requests
pub const TAB_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
/// Deadline for UI-originated requests, shorter so panels stay responsive
pub const UI_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Per-kind message handler
///
/// Returning `Ok(None)` acknowledges with an empty payload; returning
/// `Err` produces a failure response carrying the error text. Handlers
/// never see the reply channel and cannot leave a request unanswered.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<Option<Value>>;
}

/// Blanket impl so closures can register as handlers
#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Option<Value>>> + Send,
{
    async fn handle(&self, envelope: Envelope) -> Result<Option<Value>> {
        self(envelope).await
    }
}

/// Handler registry for one execution context
#[derive(Default)]
pub struct MessageRouter {
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
}

impl MessageRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a message kind, replacing any previous one
    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            warn!("Replaced existing handler for '{kind}'");
        }
    }

    #[must_use]
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Dispatch an envelope to its handler
    ///
    /// Always yields a response. An unregistered request kind is a
    /// failure response; an unregistered status-only kind is a silent
    /// acknowledgment, since broadcasts carry no obligation to listen.
    pub async fn dispatch(&self, envelope: Envelope) -> Response {
        let handler = self.handlers.get(&envelope.kind).map(|h| Arc::clone(&h));
        match handler {
            Some(handler) => match handler.handle(envelope.clone()).await {
                Ok(payload) => Response::ok(payload),
                Err(e) => {
                    warn!("Handler for '{}' failed: {e:#}", envelope.kind);
                    Response::err(e.to_string())
                }
            },
            None if envelope.is_status_only() => {
                debug!("No observer for status message '{}'", envelope.kind);
                Response::ok(None)
            }
            None => Response::err(format!("no handler registered for '{}'", envelope.kind)),
        }
    }
}

type Inbox = mpsc::Sender<(Envelope, Option<oneshot::Sender<Response>>)>;

/// In-process transport connecting the execution contexts
///
/// Contexts share no memory; everything crosses through here as
/// serialized-shape envelopes.
#[derive(Default)]
pub struct ChannelTransport {
    inboxes: DashMap<ContextId, Inbox>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context's router and spawn its dispatcher task
    ///
    /// The task runs until the transport drops the inbox (context
    /// re-registration or transport teardown).
    pub fn register_context(&self, context: ContextId, router: Arc<MessageRouter>) {
        let (tx, mut rx) =
            mpsc::channel::<(Envelope, Option<oneshot::Sender<Response>>)>(64);
        self.inboxes.insert(context, tx);

        tokio::spawn(async move {
            while let Some((envelope, reply)) = rx.recv().await {
                let response = router.dispatch(envelope).await;
                if let Some(reply) = reply {
                    // Requester may have timed out and dropped the receiver
                    let _ = reply.send(response);
                }
            }
            debug!("Dispatcher for {context:?} exited");
        });
    }

    /// Tear down a context's inbox; in-flight requests to it will resolve
    /// as channel-closed or timeout errors
    pub fn unregister_context(&self, context: ContextId) {
        self.inboxes.remove(&context);
    }

    #[must_use]
    pub fn is_registered(&self, context: ContextId) -> bool {
        self.inboxes.contains_key(&context)
    }

    /// Send a request and await its response within `timeout`
    pub async fn request(
        &self,
        target: ContextId,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Response, CoordinationError> {
        let inbox = self
            .inboxes
            .get(&target)
            .map(|i| i.clone())
            .ok_or(CoordinationError::ContextUnavailable(target))?;

        let kind = envelope.kind.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        inbox
            .send((envelope, Some(reply_tx)))
            .await
            .map_err(|_| CoordinationError::ContextUnavailable(target))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CoordinationError::ChannelClosed(kind)),
            Err(_) => Err(CoordinationError::RequestTimeout {
                kind,
                context: target,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Best-effort one-way delivery; a missing or saturated inbox is
    /// logged and swallowed
    pub fn notify(&self, target: ContextId, envelope: Envelope) {
        let Some(inbox) = self.inboxes.get(&target) else {
            debug!("Dropping '{}': {target:?} not registered", envelope.kind);
            return;
        };
        if let Err(e) = inbox.try_send((envelope, None)) {
            debug!("Dropping status message for {target:?}: {e}");
        }
    }
}
