//! In-process ports backed by tokio channels.
//!
//! [`pair`] plays the role of a worker link: whatever one end posts, the other
//! end's handlers receive. Envelopes move through the channel as-is, so
//! buffers arrive as the very same byte regions.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::{
    Envelope, Fault, Port, PortEvent, PortHandler, TaskSupervisor,
    error::{Error, ErrorKind, Result},
};

/// Creates two connected ports.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
#[must_use]
pub fn pair() -> (ChannelPort, ChannelPort) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (ChannelPort::new(b_tx, a_rx), ChannelPort::new(a_tx, b_rx))
}

/// One end of an in-process channel.
///
/// Cloning yields another handle to the same end. Inbound events are pumped
/// by a background task started on the first [`subscribe`](Port::subscribe);
/// until then they wait in the channel.
#[derive(Clone)]
pub struct ChannelPort(Arc<Inner>);

struct Inner {
    outbound: mpsc::UnboundedSender<PortEvent>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<PortEvent>>>,
    handlers: Arc<RwLock<Vec<PortHandler>>>,
    task_supervisor: TaskSupervisor,
}

impl ChannelPort {
    fn new(
        outbound: mpsc::UnboundedSender<PortEvent>,
        inbound: mpsc::UnboundedReceiver<PortEvent>,
    ) -> Self {
        Self(Arc::new(Inner {
            outbound,
            inbound: Mutex::new(Some(inbound)),
            handlers: Arc::default(),
            task_supervisor: TaskSupervisor::create(),
        }))
    }

    /// Reports a fault to the other end, the way a worker runtime surfaces an
    /// uncaught error.
    ///
    /// # Errors
    ///
    /// Returns `SendFailed` if the other end is gone.
    pub fn report_fault(&self, fault: Fault) -> Result<()> {
        self.send(PortEvent::Fault(fault))
    }

    /// Stops delivering inbound events. Posts from the other end fail once
    /// the pump has shut down.
    pub fn close(&self) {
        self.0.task_supervisor.stop();
        self.0
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.task_supervisor.is_stopped()
    }

    /// Waits until the inbound pump has exited after [`close`](Self::close).
    pub async fn join(&self) {
        self.0.task_supervisor.all_stopped().await;
    }

    fn send(&self, event: PortEvent) -> Result<()> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::SendFailed, "port closed".into()));
        }
        self.0
            .outbound
            .send(event)
            .map_err(|_| Error::new(ErrorKind::SendFailed, "peer port closed".into()))
    }

    fn start_pump(&self, receiver: mpsc::UnboundedReceiver<PortEvent>) {
        let Some(guard) = self.0.task_supervisor.admit() else {
            tracing::debug!("port closed, pump not started");
            return;
        };
        let handlers = self.0.handlers.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = guard.stopped() => {
                    tracing::debug!("stop port pump");
                }
                () = Self::pump(receiver, &handlers) => {}
            }
        });
    }

    async fn pump(
        mut receiver: mpsc::UnboundedReceiver<PortEvent>,
        handlers: &RwLock<Vec<PortHandler>>,
    ) {
        while let Some(event) = receiver.recv().await {
            // handlers may subscribe more handlers, so never call them under the lock.
            let snapshot = handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for handler in &snapshot {
                handler(&event);
            }
        }
        tracing::debug!("peer port hung up");
    }
}

impl Port for ChannelPort {
    fn post(&self, envelope: Envelope) -> Result<()> {
        self.send(PortEvent::Message(envelope))
    }

    fn subscribe(&self, handler: PortHandler) {
        self.0
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);

        let receiver = self
            .0
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(receiver) = receiver {
            self.start_pump(receiver);
        }
    }
}

impl std::fmt::Debug for ChannelPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPort")
            .field("closed", &self.is_closed())
            .finish()
    }
}
