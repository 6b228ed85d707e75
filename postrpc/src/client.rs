use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_inline_default::serde_inline_default;

use crate::{
    Emitter, Envelope, Listener, Message, Port, PortEvent, Token, Value, Waiter,
    error::{Error, ErrorKind, Result},
};

/// Local event carrying transport faults reported by a peer.
pub const ERROR_EVENT: &str = "error";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[serde_inline_default]
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct ClientConfig {
    #[serde_inline_default(DEFAULT_TIMEOUT)]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
}

impl CallOptions {
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[derive(Default)]
struct Shared {
    waiter: Waiter,
    emitter: Emitter,
}

impl Shared {
    fn on_event(&self, event: &PortEvent) {
        match event {
            PortEvent::Message(envelope) => self.on_message(&envelope.message),
            PortEvent::Fault(fault) => {
                tracing::warn!(
                    "peer fault at {}:{}: {}",
                    fault.filename,
                    fault.lineno,
                    fault.message
                );
                self.emitter.emit(ERROR_EVENT, &fault.to_value());
            }
        }
    }

    fn on_message(&self, message: &Message) {
        match message {
            Message::Error { token, error } => {
                self.waiter.post(token, Err(Error::remote(error.as_str())));
            }
            Message::Reply { token, payload, .. } => {
                self.waiter.post(token, Ok(payload.clone()));
            }
            Message::Notification {
                event_name,
                payload,
            } => self.emitter.emit(event_name, payload),
            Message::Call { method, .. } => {
                tracing::trace!("ignore call to {method} arriving at a client");
            }
            Message::Unrecognized(_) => {
                tracing::trace!("ignore unrecognized message");
            }
        }
    }
}

/// Issues calls to one or more peers and settles them from their replies.
///
/// Calls are spread over the peers round-robin. Each call is matched to its
/// reply by a fresh [`Token`] and settles exactly once: with the reply, with
/// the remote error, or with a timeout. Notifications from the peers are
/// delivered to listeners registered with [`on`](Client::on).
pub struct Client {
    config: ClientConfig,
    peers: Vec<Arc<dyn Port>>,
    cursor: AtomicUsize,
    shared: Arc<Shared>,
}

impl Client {
    /// Creates a client over `peers` and subscribes to each of them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `peers` is empty.
    pub fn new<P: Port>(peers: impl IntoIterator<Item = P>, config: ClientConfig) -> Result<Self> {
        let peers: Vec<Arc<dyn Port>> = peers
            .into_iter()
            .map(|peer| Arc::new(peer) as Arc<dyn Port>)
            .collect();
        if peers.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "client needs at least one peer".into(),
            ));
        }

        let shared = Arc::new(Shared::default());
        for peer in &peers {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            peer.subscribe(Arc::new(move |event: &PortEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_event(event);
                }
            }));
        }

        Ok(Self {
            config,
            peers,
            cursor: AtomicUsize::new(0),
            shared,
        })
    }

    /// Calls `method` on the next peer.
    ///
    /// Dropping the returned future before it completes forgets the call;
    /// a reply arriving later is discarded.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty method name or a zero timeout.
    /// - `SendFailed` if the peer refused the message.
    /// - `Remote` with the host's error string.
    /// - `Timeout` if no reply arrived in time. It displays as
    ///   `Timeout exceeded for RPC method "<method>"`.
    pub async fn call(
        &self,
        method: &str,
        payload: impl Into<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        if method.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "method name is empty".into(),
            ));
        }
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        if timeout.is_zero() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("zero timeout for RPC method \"{method}\""),
            ));
        }

        let (token, receiver) = self.shared.waiter.alloc();
        let envelope = Envelope::new(Message::Call {
            token,
            method: method.to_string(),
            payload: payload.into(),
        });
        let peer = &self.peers[self.next_peer()];
        tracing::trace!("call {method} with token {token}");
        peer.post(envelope)?;

        if let Ok(result) = tokio::time::timeout(timeout, receiver.recv()).await {
            result
        } else {
            Err(Error::new(
                ErrorKind::Timeout,
                format!("Timeout exceeded for RPC method \"{method}\""),
            ))
        }
    }

    /// Calls `method` with the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_default(&self, method: &str, payload: impl Into<Value>) -> Result<Value> {
        self.call(method, payload, CallOptions::default()).await
    }

    /// Calls `method` with a serde request and decodes the reply.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call); additionally `SerializeFailed` and
    /// `DeserializeFailed` for payloads that do not fit the types.
    pub async fn request<Req, Rsp>(&self, method: &str, req: &Req) -> Result<Rsp>
    where
        Req: Serialize + ?Sized,
        Rsp: DeserializeOwned,
    {
        let payload = Value::encode(req)?;
        self.call_default(method, payload).await?.decode()
    }

    /// Registers `listener` for notifications named `event`.
    ///
    /// Listeners run on the port's delivery task in registration order. A
    /// listener that panics is logged and skipped.
    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.shared.emitter.on(event, listener);
    }

    /// Removes one registration of `listener`. Returns whether one was found.
    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        self.shared.emitter.off(event, listener)
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.emitter.listener_count(event)
    }

    /// Number of calls still waiting for an outcome.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.waiter.len()
    }

    #[must_use]
    pub fn is_pending(&self, token: &Token) -> bool {
        self.shared.waiter.contains_token(token)
    }

    /// Number of peers calls are spread over.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn next_peer(&self) -> usize {
        let len = self.peers.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
        {
            Ok(i) | Err(i) => i,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("peers", &self.peers.len())
            .field("pending", &self.shared.waiter.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(2));

        let parsed: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, config);

        let parsed: ClientConfig = serde_json::from_str(r#"{"timeout":"150ms"}"#).unwrap();
        assert_eq!(parsed.timeout, Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let err = Client::new(Vec::<channel::ChannelPort>::new(), ClientConfig::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let (port, _other) = channel::pair();
        let client = Client::new([port], ClientConfig::default()).unwrap();
        let err = client.call_default("", Value::Null).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = client
            .call("add", Value::Null, CallOptions::timeout(Duration::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_failed_leaves_nothing_pending() {
        let (port, other) = channel::pair();
        other.close();
        let client = Client::new([port], ClientConfig::default()).unwrap();

        let err = client.call_default("add", Value::Null).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SendFailed);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_round_robin_cursor() {
        let ports: Vec<_> = (0..3).map(|_| channel::pair().0).collect();
        let client = Client::new(ports, ClientConfig::default()).unwrap();
        let picked: Vec<_> = (0..7).map(|_| client.next_peer()).collect();
        assert_eq!(picked, [0, 1, 2, 0, 1, 2, 0]);
    }
}
