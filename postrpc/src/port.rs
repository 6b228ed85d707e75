use std::sync::Arc;

use crate::{Envelope, Result, Value};

/// A fault reported by the runtime behind a port, such as an uncaught error
/// in a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub lineno: u32,
    pub filename: String,
}

impl Fault {
    #[must_use]
    pub fn to_value(&self) -> Value {
        [
            ("message", Value::from(self.message.as_str())),
            ("lineno", Value::from(u64::from(self.lineno))),
            ("filename", Value::from(self.filename.as_str())),
        ]
        .into_iter()
        .collect()
    }
}

/// Something arriving on a port.
#[derive(Debug, Clone)]
pub enum PortEvent {
    Message(Envelope),
    Fault(Fault),
}

pub type PortHandler = Arc<dyn Fn(&PortEvent) + Send + Sync>;

/// One end of a one-way message channel.
///
/// This is the whole contract the protocol needs from a transport: post a
/// message with its transfer list, and call back once per inbound event.
/// Delivery is at most once and unordered relative to other ports.
pub trait Port: Send + Sync + 'static {
    /// Sends `envelope` to the other end. Buffers listed in
    /// `envelope.transfer` move to the receiver.
    ///
    /// # Errors
    ///
    /// Returns `SendFailed` if the other end is gone.
    fn post(&self, envelope: Envelope) -> Result<()>;

    /// Registers a handler invoked once per inbound event, after every
    /// handler registered before it.
    fn subscribe(&self, handler: PortHandler);
}

impl<P: Port + ?Sized> Port for Arc<P> {
    fn post(&self, envelope: Envelope) -> Result<()> {
        (**self).post(envelope)
    }

    fn subscribe(&self, handler: PortHandler) {
        (**self).subscribe(handler);
    }
}
