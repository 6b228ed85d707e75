#![forbid(unsafe_code)]

use std::sync::Arc;

use postrpc::{Client, ClientConfig, ErrorKind, Router, Server, channel};
use postrpc_demo::{Calculator, DemoHost, Host, HostInfo, Operands, SleepReq};

fn setup(id: usize) -> (Server, Client) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let host = Arc::new(DemoHost::new(id));
    let mut router = Router::default();
    Calculator::postrpc_export(host.clone(), &mut router);
    Host::postrpc_export(host, &mut router);

    let (host_end, client_end) = channel::pair();
    let server = Server::new(router, host_end);
    let client = Client::new([client_end], ClientConfig::default()).unwrap();
    (server, client)
}

#[test]
fn test_export_registers_every_method() {
    let host = Arc::new(DemoHost::new(0));
    let mut router = Router::default();
    Calculator::postrpc_export(host.clone(), &mut router);
    Host::postrpc_export(host, &mut router);

    let mut names: Vec<_> = router.method_names().cloned().collect();
    names.sort();
    assert_eq!(names, ["add", "div", "mul", "pow", "sleep", "sub", "whoami"]);
    assert_eq!(<DemoHost as Calculator>::NAME, "Calculator");
    assert_eq!(<Client as Host>::NAME, "Host");
}

#[tokio::test]
async fn test_calculator() {
    let (_server, client) = setup(0);

    assert_eq!(client.add(&Operands { x: 1, y: 1 }).await.unwrap(), 2);
    assert_eq!(client.sub(&Operands { x: 1, y: 3 }).await.unwrap(), -2);
    assert_eq!(client.mul(&Operands { x: 6, y: 7 }).await.unwrap(), 42);
    assert_eq!(client.div(&Operands { x: 9, y: 2 }).await.unwrap(), 4);
    assert_eq!(client.pow(&Operands { x: 2, y: 10 }).await.unwrap(), 1024);

    let err = client.div(&Operands { x: 1, y: 0 }).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Remote);
    assert_eq!(err.msg, "RangeError: division by zero");

    let err = client.pow(&Operands { x: 2, y: -1 }).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Remote);
    assert!(err.msg.starts_with("InvalidArgument"));

    let err = client
        .mul(&Operands {
            x: i64::MAX,
            y: 2,
        })
        .await
        .unwrap_err();
    assert!(err.msg.contains("overflows"));
}

#[tokio::test]
async fn test_host() {
    let (_server, client) = setup(3);

    let slept = client.sleep(&SleepReq { millis: 5 }).await.unwrap();
    assert_eq!(slept, 5);

    let info = client.whoami(&()).await.unwrap();
    assert_eq!(info, HostInfo { id: 3, calls: 2 });
}

#[tokio::test]
async fn test_typed_call_matches_untyped() {
    let (_server, client) = setup(0);

    let untyped = client
        .call_default("add", serde_json::json!({ "x": 20, "y": 22 }))
        .await
        .unwrap();
    assert_eq!(untyped.as_i64(), Some(42));

    let err = client
        .call_default("add", serde_json::json!({ "x": "twenty" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Remote);
    assert!(err.msg.starts_with("DeserializeFailed"));
}
