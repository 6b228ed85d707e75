use std::sync::{Arc, Weak};

use tokio_util::sync::DropGuard;

use crate::{
    Envelope, Message, Port, PortEvent, Router, TaskSupervisor, Token, Value, context::Context,
    router::unknown_method,
};

struct ServerState {
    router: Router,
    port: Arc<dyn Port>,
    task_supervisor: TaskSupervisor,
}

impl ServerState {
    fn on_event(self: &Arc<Self>, event: &PortEvent) {
        match event {
            PortEvent::Message(envelope) => match &envelope.message {
                Message::Call {
                    token,
                    method,
                    payload,
                } => self.on_call(*token, method, payload.clone()),
                Message::Reply { .. }
                | Message::Error { .. }
                | Message::Notification { .. }
                | Message::Unrecognized(_) => {
                    tracing::trace!("ignore non-call message arriving at a server");
                }
            },
            PortEvent::Fault(fault) => {
                tracing::debug!("ignore fault on server port: {}", fault.message);
            }
        }
    }

    fn on_call(self: &Arc<Self>, token: Token, method: &str, payload: Value) {
        let Some(guard) = self.task_supervisor.admit() else {
            tracing::debug!("server stopped, ignore call to {method}");
            return;
        };

        let ctx = Context::new(self.port.clone(), token, method.to_string());
        if !self.router.contains(method) {
            tracing::error!("unknown RPC method {method}");
            ctx.send_err_rsp(unknown_method(method));
            return;
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            let rsp = state.router.invoke(ctx.method(), payload).await;
            ctx.send_rsp(rsp);
            drop(guard);
        });
    }
}

/// Hosts the procedures of a [`Router`] on one port.
///
/// Every call runs in its own task, so a slow procedure never holds up the
/// others. The server answers each call exactly once, with a reply or with
/// an error string, and can push notifications with [`emit`](Server::emit).
///
/// # Examples
///
/// ```rust
/// # use postrpc::{Client, ClientConfig, Router, Server, Value, channel};
/// # #[tokio::main]
/// # async fn main() {
/// let (host_end, client_end) = channel::pair();
///
/// let mut router = Router::default();
/// router.add_sync_method("echo", Ok);
/// let _server = Server::new(router, host_end);
///
/// let client = Client::new([client_end], ClientConfig::default()).unwrap();
/// let rsp = client.call_default("echo", "hello").await.unwrap();
/// assert_eq!(rsp.as_str(), Some("hello"));
/// # }
/// ```
pub struct Server {
    state: Arc<ServerState>,
    _drop_guard: DropGuard,
}

impl Server {
    /// Serves `router` on `port`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(router: Router, port: impl Port) -> Self {
        let task_supervisor = TaskSupervisor::create();
        let drop_guard = task_supervisor.drop_guard();
        let state = Arc::new(ServerState {
            router,
            port: Arc::new(port),
            task_supervisor,
        });

        let weak: Weak<ServerState> = Arc::downgrade(&state);
        state.port.subscribe(Arc::new(move |event: &PortEvent| {
            if let Some(state) = weak.upgrade() {
                state.on_event(event);
            }
        }));

        Self {
            state,
            _drop_guard: drop_guard,
        }
    }

    /// Sends a one-way notification to the client side.
    ///
    /// Nothing is buffered or acknowledged; a failed post is logged and
    /// dropped.
    pub fn emit(&self, event_name: impl Into<String>, payload: impl Into<Value>) {
        let event_name = event_name.into();
        let envelope = Envelope::new(Message::Notification {
            event_name: event_name.clone(),
            payload: payload.into(),
        });
        if let Err(e) = self.state.port.post(envelope) {
            tracing::error!("emit {event_name} failed: {e}");
        }
    }

    /// The procedures this server hosts.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.state.router
    }

    /// Stops accepting calls. Calls arriving afterwards are ignored.
    ///
    /// Call [`join`](Self::join) to wait for procedures still running.
    pub fn stop(&self) {
        self.state.task_supervisor.stop();
    }

    /// Waits until every in-flight procedure has replied.
    pub async fn join(&self) {
        self.state.task_supervisor.all_stopped().await;
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("router", &self.state.router)
            .field("stopped", &self.state.task_supervisor.is_stopped())
            .finish_non_exhaustive()
    }
}
