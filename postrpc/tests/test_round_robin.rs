#![forbid(unsafe_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use postrpc::{
    CallOptions, Client, ClientConfig, Envelope, Message, Port, PortHandler, Router, Server,
    Value, channel,
};

/// Port that records what is posted to it and never answers.
struct RecordingPort {
    id: usize,
    log: Arc<Mutex<Vec<(usize, Message)>>>,
}

impl Port for RecordingPort {
    fn post(&self, envelope: Envelope) -> postrpc::Result<()> {
        self.log.lock().unwrap().push((self.id, envelope.message));
        Ok(())
    }

    fn subscribe(&self, _handler: PortHandler) {}
}

#[tokio::test(start_paused = true)]
async fn test_call_i_goes_to_peer_i_mod_m() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let peers = (0..3).map(|id| RecordingPort {
        id,
        log: log.clone(),
    });
    let client = Client::new(peers, ClientConfig::default()).unwrap();
    assert_eq!(client.peer_count(), 3);

    for i in 0..7i64 {
        let err = client
            .call("add", i, CallOptions::timeout(Duration::from_millis(1)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    let log = log.lock().unwrap();
    let targets: Vec<_> = log.iter().map(|(id, _)| *id).collect();
    assert_eq!(targets, [0, 1, 2, 0, 1, 2, 0]);

    for (i, (_, message)) in log.iter().enumerate() {
        let Message::Call {
            method, payload, ..
        } = message
        else {
            panic!("expected a call, got {message:?}");
        };
        assert_eq!(method, "add");
        assert_eq!(payload.as_u64(), Some(i as u64));
    }

    let mut tokens: Vec<_> = log.iter().filter_map(|(_, m)| m.token().copied()).collect();
    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 7);
}

#[tokio::test]
async fn test_host_pool() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut servers = Vec::new();
    let mut client_ends = Vec::new();
    for id in 0..4i64 {
        let (host_end, client_end) = channel::pair();
        let mut router = Router::default();
        router.add_sync_method("whoami", move |_| Ok(Value::from(id)));
        servers.push(Server::new(router, host_end));
        client_ends.push(client_end);
    }
    let client = Client::new(client_ends, ClientConfig::default()).unwrap();

    let mut seen = Vec::new();
    for _ in 0..8 {
        let id = client.call_default("whoami", Value::Null).await.unwrap();
        seen.push(id.as_i64().unwrap());
    }
    assert_eq!(seen, [0, 1, 2, 3, 0, 1, 2, 3]);
}

#[tokio::test]
async fn test_concurrent_calls_spread_evenly() {
    let mut servers = Vec::new();
    let mut client_ends = Vec::new();
    for id in 0..3i64 {
        let (host_end, client_end) = channel::pair();
        let mut router = Router::default();
        router.add_method("whoami", move |_| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Value::from(id))
        });
        servers.push(Server::new(router, host_end));
        client_ends.push(client_end);
    }
    let client = Client::new(client_ends, ClientConfig::default()).unwrap();

    let calls = (0..30).map(|_| client.call_default("whoami", Value::Null));
    let results = futures_util::future::join_all(calls).await;

    let mut counts = [0usize; 3];
    for result in results {
        let id = result.unwrap().as_u64().unwrap();
        counts[usize::try_from(id).unwrap()] += 1;
    }
    assert_eq!(counts, [10, 10, 10]);
    assert_eq!(client.pending_calls(), 0);
}
