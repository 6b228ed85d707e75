use std::{sync::Arc, time::Duration};

use clap::Parser;
use postrpc::{Buffer, Client, ClientConfig, ERROR_EVENT, Listener, Router, Server, Value, channel};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of ticks to emit.
    #[arg(long, default_value = "6")]
    pub ticks: u64,

    /// Interval between ticks in milliseconds.
    #[arg(long, default_value = "100")]
    pub interval_ms: u64,
}

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> postrpc::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let (host_end, client_end) = channel::pair();
    let host_end = Arc::new(host_end);
    let server = Server::new(Router::default(), host_end.clone());
    let client = Client::new([client_end], ClientConfig::default())?;

    let progress: Listener = Arc::new(|payload: &Value| {
        tracing::info!("progress listener: tick {:?}", payload.as_u64());
    });
    let logger: Listener = Arc::new(|payload: &Value| {
        tracing::info!("logger listener: {}", payload.to_json());
    });
    client.on("tick", progress.clone());
    client.on("tick", logger);
    client.on(
        "frame",
        Arc::new(|payload: &Value| {
            let len = payload.as_buffer().map_or(0, Buffer::len);
            tracing::info!("frame of {len} bytes");
        }),
    );
    client.on(
        ERROR_EVENT,
        Arc::new(|payload: &Value| {
            tracing::warn!("host fault: {}", payload.to_json());
        }),
    );

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    for tick in 0..args.ticks {
        interval.tick().await;
        if tick == args.ticks / 2 {
            client.off("tick", &progress);
            tracing::info!("progress listener unsubscribed");
        }
        server.emit("tick", tick);
    }

    server.emit("frame", Buffer::from(bytes::Bytes::from_static(b"raw frame")));
    host_end.report_fault(postrpc::Fault {
        message: "simulated fault".into(),
        lineno: 1,
        filename: "notify.rs".into(),
    })?;

    interval.tick().await;
    tracing::info!("{} tick listeners left", client.listener_count("tick"));
    Ok(())
}
