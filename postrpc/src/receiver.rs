use tokio::sync::oneshot;

use crate::{Error, ErrorKind, Result, Value, WaiterCleaner};

/// Yields the outcome of one pending call.
pub struct Receiver<'a> {
    rx: oneshot::Receiver<Result<Value>>,
    cleaner: WaiterCleaner<'a>,
}

impl<'a> Receiver<'a> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Value>>, cleaner: WaiterCleaner<'a>) -> Self {
        Self { rx, cleaner }
    }

    /// # Errors
    ///
    /// Returns the remote error the call settled with, or `SendFailed` if the
    /// pending entry vanished without an outcome.
    pub async fn recv(self) -> Result<Value> {
        let Self { rx, cleaner } = self;
        let result = rx
            .await
            .map_err(|e| Error::new(ErrorKind::SendFailed, e.to_string()))?;
        std::mem::forget(cleaner); // the entry was already removed by whoever posted.
        result
    }
}
