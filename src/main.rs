//! Minimal binary demonstrating `msrpframe` usage.
//!
//! Accepts TCP connections, runs a passive session on each and sends every
//! received message straight back to the peer.

mod cli;

use std::{io, net::SocketAddr, sync::Arc};

use clap::Parser;
use log::{info, warn};
use msrpframe::{
    Request,
    Session,
    SessionConfig,
    SessionContext,
    SessionListener,
    WriterTransport,
    inbound::ReassembledMessage,
    message::TransactionIdGenerator,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};

/// Forwards received messages to the echo task.
struct Echo(mpsc::UnboundedSender<ReassembledMessage>);

impl SessionListener for Echo {
    fn message_received(&self, message: ReassembledMessage) { let _ = self.0.send(message); }
}

async fn serve(stream: TcpStream, peer: SocketAddr, cli: Arc<cli::Cli>) {
    let (reader, writer) = stream.into_split();
    let (transport, _writer_task) = WriterTransport::spawn(writer);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = SessionContext::new(cli.local_path.clone(), cli.remote_path.clone());
    let session = match Session::new(SessionConfig::default()) {
        Ok(session) => session,
        Err(e) => {
            warn!("invalid session config: error={e}");
            return;
        }
    };
    let handle = session.accept(transport, reader, ctx, Echo(tx));
    info!("connection accepted: peer={peer}");

    let ids = TransactionIdGenerator::new("echo");
    while let Some(message) = rx.recv().await {
        let reply = Request::send(
            handle.remote_path(),
            handle.local_path(),
            ids.message_id(),
            message.content_type(),
            message.body().clone(),
        );
        if let Err(e) = handle.send(reply).await {
            warn!("echo failed: peer={peer}, error={e}");
        }
    }
    let reason = handle.closed().await;
    info!("connection finished: peer={peer}, reason={reason}");
}

#[tokio::main]
async fn main() -> io::Result<()> {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Arc::new(cli::Cli::parse());

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(io::Error::other)?;
    }

    let listener = TcpListener::bind(cli.listen).await?;
    info!("listening: addr={}", cli.listen);
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(serve(stream, peer, Arc::clone(&cli)));
    }
}
