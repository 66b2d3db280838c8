//! TCP transport: one JSON document per line
//!
//! Each connection gets a reader task, which runs the handler inline, and a
//! writer task that drains the connection's `ChannelSocket`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use tidings_core::{BrokerError, BrokerResult};

use crate::{
    new_socket_id, ChannelSocket, FrameReceiver, MessageHandler, SocketRef, SocketType,
    MAX_FRAME_LEN,
};

/// Listening TCP endpoint
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
    socket_type: SocketType,
    buffer: usize,
}

impl TcpTransport {
    /// Bind to a local address; accepted peers are of `socket_type`
    pub async fn bind(
        addr: SocketAddr,
        socket_type: SocketType,
        buffer: usize,
    ) -> BrokerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(TcpTransport {
            listener,
            local_addr,
            socket_type,
            buffer,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever, serving each with `handler`
    pub async fn serve<H: MessageHandler>(self, handler: Arc<H>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, socket_type = %self.socket_type, "accepted connection");
                    spawn_connection(stream, peer, self.socket_type, self.buffer, handler.clone());
                }
                Err(e) => {
                    tracing::warn!("TCP accept error: {}", e);
                }
            }
        }
    }
}

/// Dial `addr` and serve the connection with `handler`
pub async fn connect<H: MessageHandler>(
    addr: SocketAddr,
    socket_type: SocketType,
    buffer: usize,
    handler: Arc<H>,
) -> BrokerResult<SocketRef> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| BrokerError::Transport(format!("failed to connect to {addr}: {e}")))?;
    Ok(spawn_connection(stream, addr, socket_type, buffer, handler))
}

/// Start the reader and writer tasks of one connection
pub fn spawn_connection<H: MessageHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    socket_type: SocketType,
    buffer: usize,
    handler: Arc<H>,
) -> SocketRef {
    let id = new_socket_id(socket_type, &peer.to_string());
    let (socket, rx) = ChannelSocket::new(id.clone(), socket_type, buffer);
    let socket: SocketRef = Arc::new(socket);
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(write_loop(write_half, rx, id.to_string()));

    let reader_socket = socket.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut frame = Vec::new();
        loop {
            match read_frame(&mut reader, &mut frame, MAX_FRAME_LEN).await {
                Ok(true) => {
                    if frame.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    handler.handle_message(reader_socket.clone(), &frame);
                }
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(socket = %id, "TCP receive error: {}", e);
                    break;
                }
            }
        }
        tracing::debug!(socket = %id, "connection closed");
        handler.on_socket_closed(&id);
    });

    socket
}

/// Read one newline-terminated frame into `buf`, without the terminator
///
/// Returns `false` at end of stream. A frame longer than `max_len` bytes is
/// an error; the bytes are not interpreted here.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> BrokerResult<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = max_len as u64 + 1;
    let read = (&mut *reader)
        .take(limit)
        .read_until(b'\n', buf)
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?;
    if read == 0 {
        return Ok(false);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read as u64 == limit {
        return Err(BrokerError::Transport(format!(
            "frame longer than {max_len} bytes"
        )));
    }
    Ok(true)
}

async fn write_loop(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut rx: FrameReceiver,
    socket: String,
) {
    while let Some(mut frame) = rx.recv().await {
        frame.push(b'\n');
        if let Err(e) = writer.write_all(&frame).await {
            tracing::warn!(%socket, "TCP send error: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}
