//! WebSocket server for a `websocket` alert channel
//!
//! Every accepted connection is attached to the channel and receives each
//! broadcast alert as a text frame. Inbound frames are ignored except for
//! ping (answered by tungstenite) and close.

use anyhow::{Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use herald_core::channels::WebSocketChannel;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Accept subscribers on `addr` until `cancel` fires
pub async fn serve(addr: SocketAddr, channel: Arc<WebSocketChannel>, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind WebSocket server on {}", addr))?;
    info!("WebSocket server listening on ws://{}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "WebSocket accept failed");
                    continue;
                }
            },
        };

        let channel = Arc::clone(&channel);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, channel, cancel).await {
                debug!(%peer, error = %e, "WebSocket connection ended with error");
            }
        });
    }

    info!("WebSocket server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    channel: Arc<WebSocketChannel>,
    cancel: CancellationToken,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut sink, mut source) = ws.split();
    let (id, mut alerts) = channel.attach();
    info!(%peer, connection = id, subscribers = channel.connection_count(), "WebSocket subscriber connected");

    let outcome = pump(&mut sink, &mut source, &mut alerts, &cancel).await;

    channel.detach(id);
    info!(%peer, connection = id, "WebSocket subscriber disconnected");
    outcome
}

async fn pump(
    sink: &mut WsSink,
    source: &mut WsSource,
    alerts: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            payload = alerts.recv() => match payload {
                Some(text) => sink.send(Message::Text(text)).await?,
                // Detached by the channel (slow consumer)
                None => return Ok(()),
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}
