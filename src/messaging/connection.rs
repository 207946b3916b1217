use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_64_REDIS};
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tracing::{debug, instrument, trace, warn};

use crate::messaging::net_message::NetMessage;


/// length (u32) followed by checksum (u64)
pub const FRAME_HEADER_LEN: usize = 4 + 8;

const CHECKSUM: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);


#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConnectionId(pub u64);
impl Debug for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}


/// This trait decouples a [Connection]'s I/O from what happens to the messages it receives, and
///  from the bookkeeping of open connections.
#[cfg_attr(test, automock)]
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_message(&self, connection: ConnectionId, msg: NetMessage);

    /// Called when the connection is dead from this side's perspective: remote close, I/O error
    ///  or a frame that could not be decoded. May be called more than once for the same
    ///  connection, so handling must be idempotent.
    fn on_closed(&self, connection: ConnectionId);
}


#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendOutcome {
    Queued,
    /// the connection's queue is full, i.e. the peer does not keep up - the frame was dropped
    Dropped,
    /// the connection's write task has terminated, the connection should be removed
    Closed,
}


/// A single message-framed TCP link to some other node. Incoming frames are decoded and handed to
///  the [ConnectionHandler] from a dedicated read task. Outgoing frames go through a bounded queue
///  to a dedicated write task, which is the only place writing to the socket - so concurrent
///  senders are serialized, and [Connection::send] never waits for the network.
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    read_task: AbortHandle,
    write_task: AbortHandle,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection{{{:?}@{}}}", self.id, self.remote_addr)
    }
}

impl Connection {
    pub fn spawn(
        id: ConnectionId,
        stream: TcpStream,
        max_frame_len: usize,
        send_queue_len: usize,
        handler: Arc<dyn ConnectionHandler>,
    ) -> anyhow::Result<Connection> {
        let remote_addr = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY for {}: {}", remote_addr, e);
        }
        let (reader, writer) = stream.into_split();
        let (outbound, outbound_recv) = mpsc::channel(send_queue_len);

        let read_task = tokio::spawn(read_loop(id, remote_addr, reader, max_frame_len, handler.clone()))
            .abort_handle();
        let write_task = tokio::spawn(write_loop(id, remote_addr, writer, outbound_recv, handler))
            .abort_handle();

        debug!("opened connection {:?} to {}", id, remote_addr);
        Ok(Connection {
            id,
            remote_addr,
            outbound,
            read_task,
            write_task,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// enqueues an encoded frame (see [encode_frame]) without waiting
    pub fn send(&self, frame: Bytes) -> SendOutcome {
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                warn!("send queue for {:?} is full - dropping frame", self);
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("{:?} is closed - cannot send", self);
                SendOutcome::Closed
            }
        }
    }

    pub fn close(&self) {
        debug!("closing {:?}", self);
        self.read_task.abort();
        self.write_task.abort();
    }
}


#[instrument(name="connection_read", skip_all, fields(id=?id, addr=%remote_addr))]
async fn read_loop(id: ConnectionId, remote_addr: SocketAddr, mut reader: OwnedReadHalf, max_frame_len: usize, handler: Arc<dyn ConnectionHandler>) {
    loop {
        match read_frame(&mut reader, max_frame_len).await {
            Ok(Some(body)) => {
                match NetMessage::try_deser(&mut body.as_ref()) {
                    Ok(msg) => {
                        trace!("received {:?}", msg);
                        handler.on_message(id, msg);
                    }
                    Err(e) => {
                        warn!("received a frame that is not a valid message - closing connection: {}", e);
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("connection closed by peer");
                break;
            }
            Err(e) => {
                warn!("error reading from connection - closing it: {}", e);
                break;
            }
        }
    }
    handler.on_closed(id);
}

#[instrument(name="connection_write", skip_all, fields(id=?id, addr=%remote_addr))]
async fn write_loop(id: ConnectionId, remote_addr: SocketAddr, mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<Bytes>, handler: Arc<dyn ConnectionHandler>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("error writing to connection - closing it: {}", e);
            break;
        }
    }
    handler.on_closed(id);
}


/// Serializes a message into a complete frame: body length, CRC-64 of the body, body.
pub fn encode_frame(msg: &NetMessage, max_frame_len: usize) -> anyhow::Result<Bytes> {
    let mut body = BytesMut::new();
    msg.ser(&mut body);
    if body.len() > max_frame_len {
        bail!("message of {} bytes exceeds max frame length of {}", body.len(), max_frame_len);
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.put_u32(body.len().try_into()?);
    frame.put_u64(CHECKSUM.checksum(&body));
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Reads a single frame and returns its verified body, or `None` if the stream ended cleanly
///  before the frame's first byte.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_frame_len: usize) -> anyhow::Result<Option<Bytes>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let (len, checksum) = header.split_at(4);
    let len = u32::from_be_bytes(len.try_into()?) as usize;
    let checksum = u64::from_be_bytes(checksum.try_into()?);

    if len > max_frame_len {
        return Err(anyhow!("received a frame of {} bytes, exceeding the max frame length of {}", len, max_frame_len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    if CHECKSUM.checksum(&body) != checksum {
        bail!("checksum mismatch in received frame");
    }
    Ok(Some(Bytes::from(body)))
}
