use dashmap::{DashMap, mapref::entry::Entry};
use foldhash::fast::RandomState;
use tokio::sync::oneshot;

use crate::{Receiver, Result, Token, TokenGenerator, Value};

/// Pending calls, keyed by correlation token.
///
/// Each entry holds the completion channel of one in-flight call. Whoever
/// removes the entry first settles the call, so a token resolves at most once:
/// a reply or error through [`post`](Waiter::post), a timeout or a dropped
/// caller through the receiver's cleaner.
#[derive(Default)]
pub struct Waiter {
    tokens: TokenGenerator,
    id_map: DashMap<Token, oneshot::Sender<Result<Value>>, RandomState>,
}

/// Removes the waiter entry when dropped.
///
/// Dropping the receiver before it yields, because of a timeout or because the
/// caller gave up, leaves nothing behind.
pub struct WaiterCleaner<'a> {
    waiter: &'a Waiter,
    token: Token,
}

impl Drop for WaiterCleaner<'_> {
    fn drop(&mut self) {
        self.waiter.remove(&self.token);
    }
}

impl Waiter {
    /// Registers a new pending call.
    ///
    /// Returns its token and the receiver that will yield the outcome. A token
    /// that collides with an outstanding one is discarded and redrawn.
    pub fn alloc(&self) -> (Token, Receiver<'_>) {
        let (tx, rx) = oneshot::channel();
        let token = loop {
            let token = self.tokens.next();
            match self.id_map.entry(token) {
                Entry::Occupied(_) => {
                    tracing::warn!("token collision on {token}, drawing another");
                }
                Entry::Vacant(entry) => {
                    entry.insert(tx);
                    break token;
                }
            }
        };
        (
            token,
            Receiver::new(
                rx,
                WaiterCleaner {
                    waiter: self,
                    token,
                },
            ),
        )
    }

    /// Settles the pending call for `token`.
    ///
    /// Returns false if no call is waiting, e.g. the reply arrived after the
    /// timeout. Such a result is dropped.
    pub fn post(&self, token: &Token, result: Result<Value>) -> bool {
        if let Some((_, tx)) = self.id_map.remove(token) {
            let _ = tx.send(result);
            true
        } else {
            tracing::warn!("no pending call for token {token}, dropping result");
            false
        }
    }

    /// Whether a call with `token` is still waiting.
    #[must_use]
    pub fn contains_token(&self, token: &Token) -> bool {
        self.id_map.contains_key(token)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }

    fn remove(&self, token: &Token) {
        self.id_map.remove(token);
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("pending", &self.id_map.len())
            .finish()
    }
}
