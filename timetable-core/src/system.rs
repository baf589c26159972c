//! System facade - lifecycle orchestration for the server core.
//!
//! Owns the transport, the handler registry, and the background loops:
//! the message loop (assembler + dispatch), the outbound loop (fragmenter +
//! transport queue), and the event loop (connection lifecycle logging).
//!
//! Shutdown discipline: handlers only *request* shutdown via
//! [`SystemHandle::request_shutdown`]; the top-level program observes
//! [`System::shutdown_requested`] and performs the actual teardown with
//! [`System::stop`]. Nothing ever joins its own task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use timetable_protocol::{fragment_with_id, MessageAssembler, MessageFrame, MessageType};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{HandlerRegistry, MessageHandler};
use crate::transport::{ConnectionState, TcpTransport, TransportEvent};

/// One logical reply on its way to the wire.
#[derive(Debug)]
pub(crate) struct OutboundMessage {
    pub message_id: String,
    pub payload: String,
    pub message_type: MessageType,
}

/// The facade handle given to message handlers.
///
/// Cheap to clone behind `Arc`; safe to move into spawned tasks (the
/// algorithm handler forwards run events from one).
pub struct SystemHandle {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    conn_state: Arc<ConnectionState>,
    running: Arc<AtomicBool>,
    started_at: Instant,
    shutdown_tx: watch::Sender<bool>,
    algorithm_timeout: Duration,
}

impl SystemHandle {
    /// Send a reply correlated to `message_id`. The payload is fragmented
    /// under that id so the client can match request and reply. Returns
    /// `false` when no client is connected.
    pub fn send_message(&self, message_id: &str, payload: &str, message_type: MessageType) -> bool {
        if !self.conn_state.is_connected() {
            warn!("cannot send message {message_id}: no client connected");
            return false;
        }
        self.outbound_tx
            .send(OutboundMessage {
                message_id: message_id.to_string(),
                payload: payload.to_string(),
                message_type,
            })
            .is_ok()
    }

    /// Request system shutdown. Never blocks and never joins - the
    /// top-level program performs the teardown.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_client_connected(&self) -> bool {
        self.conn_state.is_connected()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn algorithm_timeout(&self) -> Duration {
        self.algorithm_timeout
    }

    /// Observe shutdown requests from handler tests.
    #[cfg(test)]
    pub(crate) fn shutdown_signal_for_tests(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Handle wired to nothing but an outbound queue, for handler tests.
    #[cfg(test)]
    pub(crate) fn detached(
        algorithm_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let conn_state = Arc::new(ConnectionState::default());
        conn_state.set_connected(true);
        let (shutdown_tx, _) = watch::channel(false);
        let handle = Arc::new(Self {
            outbound_tx,
            conn_state,
            running: Arc::new(AtomicBool::new(true)),
            started_at: Instant::now(),
            shutdown_tx,
            algorithm_timeout,
        });
        (handle, outbound_rx)
    }
}

pub struct System {
    transport: Arc<TcpTransport>,
    registry: Arc<HandlerRegistry>,
    handle: Arc<SystemHandle>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    inbound_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<MessageFrame>>>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    outbound_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl System {
    /// Bind the listening socket and wire the internal queues. Handlers are
    /// registered afterwards, then [`start`](Self::start) brings up the loops.
    pub fn new(config: &ServerConfig) -> std::io::Result<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let conn_state = Arc::new(ConnectionState::default());
        let transport = Arc::new(TcpTransport::bind(
            config.port,
            Arc::clone(&conn_state),
            inbound_tx,
            events_tx,
        )?);

        let running = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, _) = watch::channel(false);

        let handle = Arc::new(SystemHandle {
            outbound_tx,
            conn_state,
            running: Arc::clone(&running),
            started_at: Instant::now(),
            shutdown_tx: shutdown_tx.clone(),
            algorithm_timeout: config.algorithm_timeout,
        });

        info!("system initialized on {}", transport.local_addr());

        Ok(Self {
            transport,
            registry: Arc::new(HandlerRegistry::new()),
            handle,
            running,
            shutdown_tx,
            inbound_rx: parking_lot::Mutex::new(Some(inbound_rx)),
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            outbound_rx: parking_lot::Mutex::new(Some(outbound_rx)),
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Register a message handler. Startup-time only; last wins.
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.registry.register(handler);
    }

    /// Start the background loops. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("system is already running");
            return;
        }

        let mut tasks = self.tasks.lock();

        if let Some(inbound_rx) = self.inbound_rx.lock().take() {
            tasks.push(tokio::spawn(message_loop(
                inbound_rx,
                Arc::clone(&self.registry),
                Arc::clone(&self.handle),
                self.shutdown_tx.subscribe(),
            )));
        }
        if let Some(outbound_rx) = self.outbound_rx.lock().take() {
            tasks.push(tokio::spawn(outbound_loop(
                outbound_rx,
                Arc::clone(&self.transport),
                self.shutdown_tx.subscribe(),
            )));
        }
        if let Some(events_rx) = self.events_rx.lock().take() {
            tasks.push(tokio::spawn(events_loop(events_rx, self.shutdown_tx.subscribe())));
        }

        info!("system started with handlers for {:?}", self.registry.registered_types());
    }

    /// Bounded attempt to accept a client; driven by the top-level program.
    pub async fn accept_connection(&self) -> bool {
        self.transport.accept().await
    }

    /// Observe shutdown requests (from the `stop` command or `stop()`).
    pub fn shutdown_requested(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_client_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Facade handle, as given to handlers.
    pub fn handle(&self) -> Arc<SystemHandle> {
        Arc::clone(&self.handle)
    }

    /// Tear the system down: disconnect the client, close the listener, and
    /// join the background loops. Must not be called from a handler - they
    /// use [`SystemHandle::request_shutdown`] instead.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("system stopping...");
        self.shutdown_tx.send_replace(true);
        self.transport.disconnect();
        self.transport.close_listener().await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }

        info!("system stopped");
    }
}

/// Pull inbound frames, reassemble, dispatch complete messages.
/// The assembler lives here exclusively - single-writer, no locking.
async fn message_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<MessageFrame>,
    registry: Arc<HandlerRegistry>,
    handle: Arc<SystemHandle>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut assembler = MessageAssembler::new();
    debug!("message loop started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            frame = inbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let Some(message_id) = assembler.add_fragment(frame) else { continue };

                match (assembler.assembled_payload(&message_id), assembler.message_type(&message_id)) {
                    (Some(payload), Some(message_type)) => {
                        debug!("dispatching {message_type:?} message {message_id} ({} bytes)", payload.len());
                        registry.dispatch(&message_id, &payload, message_type, &handle).await;
                    }
                    _ => warn!("complete message {message_id} disappeared before dispatch"),
                }
                assembler.cleanup(&message_id);
            }
        }
    }

    if assembler.incomplete_count() > 0 {
        debug!("message loop stopped with {} incomplete messages", assembler.incomplete_count());
    }
}

/// Fragment outbound messages and feed the transport queue in FIFO order.
async fn outbound_loop(
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    transport: Arc<TcpTransport>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            message = outbound_rx.recv() => {
                let Some(message) = message else { break };
                for frame in fragment_with_id(&message.payload, message.message_type, &message.message_id) {
                    if !transport.send_frame(frame) {
                        warn!("dropping reply {}: client went away mid-send", message.message_id);
                        break;
                    }
                }
            }
        }
    }
}

/// Log connection lifecycle events.
async fn events_loop(
    mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            event = events_rx.recv() => match event {
                Some(TransportEvent::Connected(peer)) => info!("client connected from {peer}"),
                Some(TransportEvent::Disconnected) => info!("client disconnected"),
                None => break,
            }
        }
    }
}
