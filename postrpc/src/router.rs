use std::{collections::HashMap, future::Future, panic::AssertUnwindSafe};

use foldhash::fast::RandomState;
use futures_util::{FutureExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Value,
    error::{Error, ErrorKind, Result, panic_message},
};

pub type Method = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Procedure table: method name to procedure.
///
/// Built up front and handed to a [`Server`](crate::Server), which never
/// mutates it. Procedures hold no per-call state, so the same procedure may
/// run many times concurrently.
#[derive(Default)]
pub struct Router {
    methods: HashMap<String, Method, RandomState>,
}

impl Router {
    /// Registers an asynchronous procedure. A later registration under the
    /// same name replaces the earlier one.
    pub fn add_method<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let method: Method = Box::new(move |payload| Box::pin(f(payload)));
        if self.methods.insert(name.clone(), method).is_some() {
            tracing::warn!("procedure {name} registered twice, keeping the latest");
        }
        self
    }

    /// Registers a procedure that completes immediately.
    pub fn add_sync_method<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.add_method(name, move |payload| std::future::ready(f(payload)))
    }

    /// Registers a procedure taking and returning serde types.
    pub fn add_typed_method<Req, Rsp, F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        Req: DeserializeOwned,
        Rsp: Serialize,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Rsp>> + Send + 'static,
    {
        self.add_method(name, move |payload: Value| {
            let fut = payload.decode::<Req>().map(&f);
            async move { Value::encode(&fut?.await?) }
        })
    }

    /// Merges `methods` in, replacing procedures with the same names.
    pub fn add_methods(&mut self, methods: HashMap<String, Method>) {
        self.methods.extend(methods);
    }

    /// Names of the registered procedures, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &String> {
        self.methods.keys()
    }

    /// Whether a procedure is registered under `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Runs `method` with `payload`.
    ///
    /// A procedure that panics is reported as an error rather than unwinding
    /// into the caller.
    ///
    /// # Errors
    ///
    /// Returns `Remote` for an unknown method, otherwise whatever the
    /// procedure failed with.
    pub async fn invoke(&self, method: &str, payload: Value) -> Result<Value> {
        let Some(func) = self.methods.get(method) else {
            return Err(Error::remote(unknown_method(method)));
        };
        match AssertUnwindSafe(async { func(payload).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!("procedure {method} panicked: {reason}");
                Err(Error::new(
                    ErrorKind::Unknown("procedure panicked".into()),
                    reason,
                ))
            }
        }
    }
}

pub(crate) fn unknown_method(method: &str) -> String {
    format!("Unknown RPC method \"{method}\"")
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.methods.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct AddReq {
        x: i64,
        y: i64,
    }

    fn calculator() -> Router {
        let mut router = Router::default();
        router
            .add_typed_method("add", |req: AddReq| async move { Ok(req.x + req.y) })
            .add_sync_method("echo", Ok)
            .add_method("slow", |payload| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(payload)
            });
        router
    }

    #[tokio::test]
    async fn test_invoke() {
        let router = calculator();
        assert_eq!(router.len(), 3);
        assert!(router.contains("add"));

        let sum = router
            .invoke("add", Value::from(json!({ "x": 1, "y": 1 })))
            .await
            .unwrap();
        assert_eq!(sum.as_i64(), Some(2));

        let echoed = router.invoke("echo", Value::from("hi")).await.unwrap();
        assert_eq!(echoed.as_str(), Some("hi"));

        let slow = router.invoke("slow", Value::from(true)).await.unwrap();
        assert_eq!(slow.as_bool(), Some(true));
    }

    #[tokio::test]
    async fn test_invoke_failures() {
        let mut router = calculator();
        router.add_sync_method("error", |_| {
            Err(Error::new(
                ErrorKind::Unknown("ReferenceError".into()),
                "err is not defined".into(),
            ))
        });
        router.add_sync_method("panic", |_| panic!("boom"));

        let err = router.invoke("length", Value::Null).await.unwrap_err();
        assert_eq!(err, Error::remote("Unknown RPC method \"length\""));

        let err = router.invoke("add", Value::from("oops")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeserializeFailed);

        let err = router.invoke("error", Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: err is not defined");

        let err = router.invoke("panic", Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "procedure panicked: boom");
    }

    #[test]
    fn test_reregister_keeps_latest() {
        let mut router = Router::default();
        router.add_sync_method("f", |_| Ok(Value::from(1i64)));
        router.add_sync_method("f", |_| Ok(Value::from(2i64)));
        assert_eq!(router.len(), 1);
        assert_eq!(router.method_names().collect::<Vec<_>>(), ["f"]);
    }

    #[tokio::test]
    async fn test_add_methods_merges() {
        let mut router = Router::default();
        router.add_sync_method("f", |_| Ok(Value::from(1i64)));

        fn two(_: Value) -> BoxFuture<'static, Result<Value>> {
            Box::pin(async { Ok(Value::from(2i64)) })
        }
        fn echo(payload: Value) -> BoxFuture<'static, Result<Value>> {
            Box::pin(async move { Ok(payload) })
        }
        let mut more: HashMap<String, Method> = HashMap::new();
        more.insert("f".into(), Box::new(two));
        more.insert("g".into(), Box::new(echo));
        router.add_methods(more);

        assert_eq!(router.len(), 2);
        assert!(router.contains("g"));
        let f = router.invoke("f", Value::Null).await.unwrap();
        assert_eq!(f.as_i64(), Some(2));
        let g = router.invoke("g", Value::from("x")).await.unwrap();
        assert_eq!(g.as_str(), Some("x"));
    }
}
