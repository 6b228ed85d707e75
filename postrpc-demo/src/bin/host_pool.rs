use std::{collections::BTreeMap, sync::Arc, time::Duration};

use clap::Parser;
use postrpc::{CallOptions, Client, ClientConfig, Router, Server, Value, channel};
use postrpc_demo::{Calculator, DemoHost, Host, Operands, SleepReq};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of hosts in the pool.
    #[arg(long, default_value = "4")]
    pub hosts: usize,

    /// Number of calls to spread over the pool.
    #[arg(long, default_value = "32")]
    pub calls: usize,

    /// Call timeout in milliseconds.
    #[arg(long, default_value = "2000")]
    pub timeout_ms: u64,

    /// Duration of the slow call used to demonstrate timeouts.
    #[arg(long, default_value = "500")]
    pub slow_ms: u64,
}

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> postrpc::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let mut servers = vec![];
    let mut ports = vec![];
    for id in 0..args.hosts {
        let (host_end, client_end) = channel::pair();
        let host = Arc::new(DemoHost::new(id));
        let mut router = Router::default();
        Calculator::postrpc_export(host.clone(), &mut router);
        Host::postrpc_export(host, &mut router);
        router.add_sync_method("checksum", |payload: Value| {
            let sum = payload
                .as_buffer()
                .map_or(0, |buf| buf.iter().map(|b| u64::from(*b)).sum::<u64>());
            Ok(Value::from(sum))
        });
        servers.push(Server::new(router, host_end));
        ports.push(client_end);
    }
    tracing::info!(
        "serving {:?} on {} hosts",
        [<DemoHost as Calculator>::NAME, <DemoHost as Host>::NAME],
        args.hosts
    );

    let client = Arc::new(Client::new(
        ports,
        ClientConfig {
            timeout: Duration::from_millis(args.timeout_ms),
        },
    )?);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..args.calls {
        let client = client.clone();
        tasks.spawn(async move {
            let x = i64::try_from(i)?;
            let sum = client.add(&Operands { x, y: 1 }).await?;
            let info = client.whoami(&()).await?;
            postrpc::Result::Ok((sum, info.id))
        });
    }
    let mut per_host = BTreeMap::<usize, usize>::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((_, id))) => *per_host.entry(id).or_default() += 1,
            Ok(Err(e)) => tracing::error!("call failed: {e}"),
            Err(e) => tracing::error!("task failed: {e}"),
        }
    }
    tracing::info!("whoami calls per host: {per_host:?}");

    let rsp = client.div(&Operands { x: 1, y: 0 }).await;
    tracing::info!("div by zero: {rsp:?}");

    let rsp = client.call_default("length", "abc").await;
    tracing::info!("unknown method: {rsp:?}");

    let frame = postrpc::Buffer::from(bytes::Bytes::from(vec![1u8; 1024]));
    let rsp = client.call_default("checksum", frame).await;
    tracing::info!("checksum of 1024 ones: {rsp:?}");

    let rsp = client
        .call(
            "sleep",
            Value::encode(&SleepReq {
                millis: args.slow_ms,
            })?,
            CallOptions::timeout(Duration::from_millis(args.slow_ms / 5 + 1)),
        )
        .await;
    tracing::info!("slow call: {rsp:?}");
    tracing::info!("pending calls after timeout: {}", client.pending_calls());

    for server in &servers {
        server.stop();
    }
    for server in &servers {
        server.join().await;
    }
    tracing::info!("all hosts stopped");
    Ok(())
}
