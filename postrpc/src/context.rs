use std::sync::Arc;

use crate::{Envelope, Error, Message, Port, Token, Value};

/// Reply handle for one incoming call.
///
/// Consumed by the reply, so each call token is answered exactly once.
pub(crate) struct Context {
    port: Arc<dyn Port>,
    token: Token,
    method: String,
}

impl Context {
    pub(crate) fn new(port: Arc<dyn Port>, token: Token, method: String) -> Self {
        Self {
            port,
            token,
            method,
        }
    }

    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn send_rsp(self, rsp: Result<Value, Error>) {
        match rsp {
            Ok(payload) => {
                let message = Message::Reply {
                    token: self.token,
                    method: self.method.clone(),
                    payload,
                };
                self.post(message);
            }
            Err(err) => self.send_err_rsp(err.to_string()),
        }
    }

    pub(crate) fn send_err_rsp(self, error: String) {
        let message = Message::Error {
            token: self.token,
            error,
        };
        self.post(message);
    }

    fn post(&self, message: Message) {
        if let Err(e) = self.port.post(Envelope::new(message)) {
            tracing::error!("reply to {} for {} lost: {e}", self.method, self.token);
        }
    }
}
