//! Connection handler
//!
//! Handles individual client connections: line framing, forwarding lines
//! to the ChatServer, and writing the client's outbound queue back to the
//! socket.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::LineCodec;
use crate::config::ConnectionConfig;
use crate::error::{AppError, CodecError};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Reader that remembers when the peer last sent any bytes
struct ActivityReader<R> {
    inner: R,
    last_read: Instant,
}

impl<R> ActivityReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            last_read: Instant::now(),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            if buf.filled().len() > before {
                self.last_read = Instant::now();
            }
        }
        poll
    }
}

type LineReader<R> = FramedRead<ActivityReader<R>, LineCodec>;

/// Wait for the next line
///
/// Returns None once the peer has sent no bytes at all for `limit`; a
/// line that trickles in slowly keeps the connection alive.
async fn next_line_within<R>(
    lines: &mut LineReader<R>,
    limit: Duration,
) -> Option<Option<Result<String, CodecError>>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let deadline = lines.get_ref().last_read + limit;
        tokio::select! {
            next = lines.next() => return Some(next),
            _ = sleep_until(deadline) => {}
        }
        if lines.get_ref().last_read + limit <= Instant::now() {
            return None;
        }
    }
}

/// Fold the read task's join result into the connection outcome
fn read_outcome(
    client_id: ClientId,
    read: Result<Result<(), AppError>, JoinError>,
) -> Result<(), AppError> {
    match read {
        Ok(result) => result,
        Err(e) => {
            error!("Read task for {} did not finish: {}", client_id, e);
            Err(AppError::Task(e))
        }
    }
}

/// Handle a new connection
///
/// Registers the client with the ChatServer, then runs a read task
/// (socket → lines → ServerCommand) and a write task (outbound queue →
/// socket) until either side ends.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: ConnectionConfig,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let codec = match config.max_line_length {
        Some(max) => LineCodec::with_max_length(max),
        None => LineCodec::new(),
    };
    let mut lines = FramedRead::with_capacity(
        ActivityReader::new(reader),
        codec,
        config.read_chunk_size.max(1),
    );
    let mut sink = FramedWrite::new(writer, LineCodec::new());

    let client_id = ClientId::new();
    debug!("Connection from {} assigned id {}", peer_addr, client_id);

    // Create channel for server -> client messages
    // tokio rejects zero-capacity channels
    let (msg_tx, mut msg_rx) = mpsc::channel::<Bytes>(config.outbound_capacity.max(1));

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            peer_addr,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Spawn read task (socket -> ServerCommand)
    let cmd_tx_read = cmd_tx.clone();
    let idle_timeout = config.idle_timeout;
    let mut read_task = tokio::spawn(async move {
        loop {
            let next = match idle_timeout {
                Some(limit) => match next_line_within(&mut lines, limit).await {
                    Some(next) => next,
                    None => {
                        info!("Client {} idle for {:?}, closing", client_id, limit);
                        break;
                    }
                },
                None => lines.next().await,
            };

            match next {
                Some(Ok(line)) => {
                    if cmd_tx_read
                        .send(ServerCommand::Line { client_id, line })
                        .await
                        .is_err()
                    {
                        debug!("Server closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!("Read error for {}: {}", client_id, e);
                    return Err(AppError::from(e));
                }
                None => {
                    debug!("Client {} closed the connection", client_id);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
        Ok(())
    });

    // Spawn write task (outbound queue -> socket)
    let write_timeout = config.write_timeout;
    let mut write_task = tokio::spawn(async move {
        while let Some(wire) = msg_rx.recv().await {
            match timeout(write_timeout, sink.send(wire)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to {} failed: {}", client_id, e);
                    return;
                }
                Err(_) => {
                    warn!("Write to {} stalled for {:?}", client_id, write_timeout);
                    return;
                }
            }
        }
        // Queue closed: the server has dropped this client
        let _ = timeout(write_timeout, sink.close()).await;
        debug!("Write task ended for {}", client_id);
    });

    let outcome = tokio::select! {
        read = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;
            // Let queued notices drain before the socket closes
            let _ = write_task.await;
            read_outcome(client_id, read)
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
            let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;
            Ok(())
        }
    };

    info!("Connection {} from {} closed", client_id, peer_addr);

    outcome
}
