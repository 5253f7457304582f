//! Raw TCP Listener (spec §4.4.3): length-prefixed framing over one or more
//! bound addresses (`receiver`/`sender`, or a single bidirectional
//! `endpoint`). Frames from a given connection are processed strictly in
//! arrival order: the socket-reading task only ever pushes onto an
//! unbounded channel, a second task drains that channel and awaits the
//! Dispatcher sequentially, and a third forwards whatever the handler wrote
//! back through `ctx.send(..)` to the socket.

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatcher::{Dispatcher, Listener, Message};
use crate::error::Result;
use crate::ids::new_session_id;

/// TCP Listener bound to one or more addresses drawn from
/// `receiver`/`sender`/`endpoint` (spec §6).
pub struct TcpListener {
    addresses: Vec<String>,
    shutdown: CancellationToken,
}

impl TcpListener {
    /// Collects every configured TCP address. Returns `None` if neither
    /// `receiver`, `sender`, nor `endpoint` was configured.
    #[must_use]
    pub fn new(config: &Config) -> Option<Self> {
        let mut addresses = Vec::new();
        if let Some(receiver) = &config.receiver {
            addresses.push(receiver.address.clone());
        }
        if let Some(sender) = &config.sender {
            if !addresses.contains(&sender.address) {
                addresses.push(sender.address.clone());
            }
        }
        if let Some(endpoint) = &config.endpoint {
            if !addresses.contains(&endpoint.address) {
                addresses.push(endpoint.address.clone());
            }
        }

        if addresses.is_empty() {
            return None;
        }

        Some(Self { addresses, shutdown: CancellationToken::new() })
    }
}

#[async_trait::async_trait]
impl Listener for TcpListener {
    async fn initialize(&self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Result<()> {
        for address in &self.addresses {
            let listener = TokioTcpListener::bind(address).await?;
            tracing::info!(address, "tcp listener starting");

            let dispatcher = dispatcher.clone();
            let own_shutdown = self.shutdown.clone();
            let outer_shutdown = shutdown.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = own_shutdown.cancelled() => break,
                        () = outer_shutdown.cancelled() => break,
                        accepted = listener.accept() => {
                            match accepted {
                                Ok((stream, peer)) => {
                                    let dispatcher = dispatcher.clone();
                                    tokio::spawn(async move {
                                        handle_connection(stream, peer.to_string(), dispatcher).await;
                                    });
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "tcp accept error");
                                }
                            }
                        }
                    }
                }
            });
        }

        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Drives one connection: a reader task pushing frames onto a channel, a
/// processor task awaiting the Dispatcher one frame at a time, and a writer
/// task flushing whatever the handler sent back through `ctx.send(..)`.
async fn handle_connection(tcp_stream: TcpStream, peer: String, dispatcher: Arc<Dispatcher>) {
    let session_id = new_session_id();
    tracing::debug!(session_id = %session_id, peer, "tcp connection accepted");

    let framed = Framed::new(tcp_stream, LengthDelimitedCodec::new());
    let (mut sink, mut stream) = framed.split();

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Bytes>();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Bytes>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = reply_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let processor_session_id = session_id.clone();
    let processor = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            dispatcher
                .on_message(Message::Socket {
                    session_id: processor_session_id.clone(),
                    frame,
                    reply: reply_tx.clone(),
                })
                .await;
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(bytes) => {
                if frame_tx.send(bytes.freeze()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "tcp frame decode error");
                break;
            }
        }
    }

    drop(frame_tx);
    let _ = processor.await;
    writer.abort();
    tracing::debug!(session_id = %session_id, "tcp connection closed");
}
