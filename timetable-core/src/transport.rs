//! Single-client TCP transport.
//!
//! Owns the listening socket and, while a client is attached, a reader task
//! and a writer task. Decoded inbound frames flow into an unbounded queue
//! consumed by the message loop; outbound frames are drained by the writer
//! in FIFO order, so the frames of one logical message reach the client in
//! sequence order.
//!
//! Connection lifecycle is reported on an event channel instead of the
//! callback pointers the protocol grew up with - the facade consumes
//! `TransportEvent`s without re-entrancy hazards.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use timetable_protocol::{codec, MessageFrame};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

const ACCEPT_WAIT: Duration = Duration::from_millis(500);
const CONNECTED_IDLE_WAIT: Duration = Duration::from_millis(100);
const LISTEN_BACKLOG: u32 = 5;

/// Connection lifecycle notifications consumed by the system facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(SocketAddr),
    Disconnected,
}

/// Shared connected flag. The transport flips it; the facade and handlers
/// read it without touching the socket.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }
}

/// Per-connection channel endpoints. Present only while a client is attached.
struct ActiveConnection {
    outbound_tx: mpsc::UnboundedSender<MessageFrame>,
    shutdown_tx: watch::Sender<bool>,
}

struct ConnectionSlot {
    state: Arc<ConnectionState>,
    active: parking_lot::Mutex<Option<ActiveConnection>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ConnectionSlot {
    /// Idempotent teardown: signal both worker tasks and drop the outbound
    /// queue. Safe to call from the reader, the writer, or the facade.
    fn disconnect(&self) {
        if !self.state.set_connected(false) {
            return;
        }
        if let Some(active) = self.active.lock().take() {
            let _ = active.shutdown_tx.send(true);
        }
        let _ = self.events_tx.send(TransportEvent::Disconnected);
    }
}

pub struct TcpTransport {
    listener: Mutex<Option<tokio::net::TcpListener>>,
    local_addr: SocketAddr,
    slot: Arc<ConnectionSlot>,
    inbound_tx: mpsc::UnboundedSender<MessageFrame>,
}

impl TcpTransport {
    /// Bind the listening socket with address reuse enabled.
    pub fn bind(
        port: u16,
        state: Arc<ConnectionState>,
        inbound_tx: mpsc::UnboundedSender<MessageFrame>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> std::io::Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            slot: Arc::new(ConnectionSlot {
                state,
                active: parking_lot::Mutex::new(None),
                events_tx,
            }),
            inbound_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.slot.state.is_connected()
    }

    /// Bounded attempt to accept a client. Returns `true` only when a new
    /// client was installed; waits briefly when already connected so the
    /// facade's accept loop never spins.
    pub async fn accept(&self) -> bool {
        if self.is_connected() {
            tokio::time::sleep(CONNECTED_IDLE_WAIT).await;
            return false;
        }

        let guard = self.listener.lock().await;
        let Some(listener) = guard.as_ref() else {
            return false;
        };

        match timeout(ACCEPT_WAIT, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                self.install(stream, peer);
                true
            }
            Ok(Err(e)) => {
                warn!("accept failed: {e}");
                false
            }
            Err(_) => false,
        }
    }

    fn install(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        *self.slot.active.lock() = Some(ActiveConnection { outbound_tx, shutdown_tx });
        self.slot.state.set_connected(true);
        let _ = self.slot.events_tx.send(TransportEvent::Connected(peer));

        tokio::spawn(reader_task(
            read_half,
            Arc::clone(&self.slot),
            self.inbound_tx.clone(),
            shutdown_rx.clone(),
        ));
        tokio::spawn(writer_task(write_half, Arc::clone(&self.slot), outbound_rx, shutdown_rx));
    }

    /// Enqueue a frame for the writer. `false` when no client is attached.
    pub fn send_frame(&self, frame: MessageFrame) -> bool {
        let guard = self.slot.active.lock();
        match guard.as_ref() {
            Some(active) => active.outbound_tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Drop the current client, if any. Idempotent.
    pub fn disconnect(&self) {
        self.slot.disconnect();
    }

    /// Close the listening socket. Subsequent connect attempts are refused.
    pub async fn close_listener(&self) {
        self.listener.lock().await.take();
    }
}

async fn reader_task(
    mut read_half: OwnedReadHalf,
    slot: Arc<ConnectionSlot>,
    inbound_tx: mpsc::UnboundedSender<MessageFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = codec::read_frame(&mut read_half) => match result {
                Ok(frame) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    // One bad frame; the stream is still aligned.
                    warn!("discarding malformed inbound frame: {e}");
                }
                Err(e) => {
                    debug!("read side closed: {e}");
                    slot.disconnect();
                    break;
                }
            }
        }
    }
}

async fn writer_task(
    mut write_half: OwnedWriteHalf,
    slot: Arc<ConnectionSlot>,
    mut outbound_rx: mpsc::UnboundedReceiver<MessageFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                // Flush anything already queued before closing.
                while let Ok(frame) = outbound_rx.try_recv() {
                    if codec::write_frame(&mut write_half, &frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = codec::write_frame(&mut write_half, &frame).await {
                        warn!("send failed: {e}");
                        slot.disconnect();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = write_half.shutdown().await;
    debug!("send worker finished");
}
