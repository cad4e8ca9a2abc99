//! # Connection
//!
//! A reference-counted, framed message channel over one TCP socket.
//!
//! A connection is obtained either by [`Connection::connect`] (client side)
//! or from a [`Listener`]'s accept callback (server side). Nothing moves
//! until [`start`](Connection::start) installs the message and close
//! callbacks and begins the read loop. Messages are opaque byte sequences;
//! framing is the 4-byte big-endian length prefix enforced by
//! [`FrameCodec`].
//!
//! ## Ordering and delivery
//! - [`send`](Connection::send) is callable from any thread; accepted
//!   messages are flushed by a single writer task, so at most one write is
//!   in flight and queue order is preserved.
//! - Received payloads and the close notification are posted to the
//!   connection's [`Region`], so user callbacks never overlap.
//! - The close callback fires exactly once per started connection, whether
//!   closure was local, peer-initiated, or caused by an I/O error.
//!
//! [`Listener`]: crate::transport::listener::Listener

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::core::codec::FrameCodec;
use crate::error::{Error, Result};
use crate::transport::reactor::Region;

/// A TCP port number; `0` asks the OS for an ephemeral port.
pub type Port = u16;

/// One whole message as moved by the transport.
pub type Message = Bytes;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Client side, TCP connect still in flight.
    Connecting = 0,
    /// Server side, socket accepted but `start` not yet called.
    Accepted = 1,
    /// Read loop running, messages flowing.
    Open = 2,
    /// Shutdown sequence in progress.
    Closing = 3,
    /// Terminal; only destruction is valid afterward.
    Closed = 4,
}

impl State {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => State::Connecting,
            1 => State::Accepted,
            2 => State::Open,
            3 => State::Closing,
            _ => State::Closed,
        }
    }
}

/// How the driver obtains its socket.
enum Source {
    Accepted(TcpStream),
    Connecting(oneshot::Receiver<io::Result<TcpStream>>),
}

/// Pieces handed to the driver task when `start` is called.
struct Startup {
    source: Source,
    outgoing_rx: mpsc::UnboundedReceiver<Bytes>,
}

/// State shared between the public handle and the driver task.
///
/// Deliberately does not include the outgoing sender: when the application
/// drops its last `Arc<Connection>` the sender goes with it, the writer task
/// observes the closed queue, and the connection tears itself down.
struct Shared {
    region: Region,
    max_message_size: usize,
    state: AtomicU8,
    shutdown: CancellationToken,
    endpoints: OnceLock<(SocketAddr, SocketAddr)>,
}

/// A framed, bidirectional message channel over one TCP socket.
pub struct Connection {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    startup: Mutex<Option<Startup>>,
}

impl Connection {
    /// Begin an asynchronous connect to `localhost:port`.
    ///
    /// Returns immediately with a handle in the [`Connecting`](State::Connecting)
    /// state. The outcome is observable only after [`start`](Connection::start):
    /// a failed connect fires the close callback.
    pub fn connect(region: &Region, port: Port) -> Arc<Self> {
        Self::connect_addr(region, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Begin an asynchronous connect to an explicit address.
    pub fn connect_addr(region: &Region, addr: SocketAddr) -> Arc<Self> {
        Self::connect_addr_with_config(region, addr, &TransportConfig::default())
    }

    /// Begin an asynchronous connect with a non-default message size limit.
    pub fn connect_addr_with_config(
        region: &Region,
        addr: SocketAddr,
        config: &TransportConfig,
    ) -> Arc<Self> {
        let (result_tx, result_rx) = oneshot::channel();
        region.handle().spawn(async move {
            let result = TcpStream::connect(addr).await;
            // Receiver gone means the connection was dropped before the
            // connect completed; the stream just closes.
            let _ = result_tx.send(result);
        });
        Arc::new(Self::new(
            region.clone(),
            Source::Connecting(result_rx),
            config.max_message_size,
        ))
    }

    /// Wrap an already-connected socket (server side).
    pub fn from_accepted(region: &Region, stream: TcpStream) -> Arc<Self> {
        Self::from_accepted_with_config(region, stream, &TransportConfig::default())
    }

    /// Wrap an already-connected socket with a non-default message size limit.
    pub fn from_accepted_with_config(
        region: &Region,
        stream: TcpStream,
        config: &TransportConfig,
    ) -> Arc<Self> {
        let local = stream.local_addr();
        let peer = stream.peer_addr();
        let connection = Self::new(
            region.clone(),
            Source::Accepted(stream),
            config.max_message_size,
        );
        if let (Ok(local), Ok(peer)) = (local, peer) {
            let _ = connection.shared.endpoints.set((local, peer));
        }
        Arc::new(connection)
    }

    fn new(region: Region, source: Source, max_message_size: usize) -> Self {
        let initial = match source {
            Source::Accepted(_) => State::Accepted,
            Source::Connecting(_) => State::Connecting,
        };
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                region,
                max_message_size,
                state: AtomicU8::new(initial as u8),
                shutdown: CancellationToken::new(),
                endpoints: OnceLock::new(),
            }),
            outgoing,
            startup: Mutex::new(Some(Startup {
                source,
                outgoing_rx,
            })),
        }
    }

    /// Install the user callbacks and begin the read loop.
    ///
    /// May be called at most once; a second call fails with
    /// [`Error::AlreadyStarted`], and calling after [`close`](Connection::close)
    /// fails with [`Error::ConnectionClosed`].
    ///
    /// `on_message_received` runs on the connection's region, once per whole
    /// frame, in wire order. `on_connection_closed` runs on the region
    /// exactly once, after the last delivered message.
    pub fn start(
        &self,
        on_message_received: impl Fn(Message) + Send + Sync + 'static,
        on_connection_closed: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let startup = {
            let mut guard = lock(&self.startup);
            if self.shared.shutdown.is_cancelled() {
                return Err(Error::ConnectionClosed);
            }
            guard.take().ok_or(Error::AlreadyStarted)?
        };
        self.shared.region.handle().spawn(drive(
            self.shared.clone(),
            startup.source,
            startup.outgoing_rx,
            Arc::new(on_message_received),
            Box::new(on_connection_closed),
        ));
        Ok(())
    }

    /// Queue a message for sending. Callable from any thread; never blocks.
    ///
    /// Fails synchronously with [`Error::OversizedMessage`] when the payload
    /// exceeds [`max_message_size`](Connection::max_message_size): no bytes
    /// reach the socket and the connection stays usable. Fails with
    /// [`Error::ConnectionClosed`] after the connection has closed. Messages
    /// queued before a client connect completes are flushed once it does.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into();
        if message.len() > self.shared.max_message_size {
            return Err(Error::OversizedMessage {
                size: message.len(),
                max: self.shared.max_message_size,
            });
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Close the connection. Idempotent; a no-op on a never-started handle.
    ///
    /// Cancels in-flight I/O and closes the socket. A started connection
    /// fires its close callback exactly once as the shutdown completes.
    pub fn close(&self) {
        let mut guard = lock(&self.startup);
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        self.shared.shutdown.cancel();
        if guard.take().is_some() {
            // Never started: drop the socket here, no driver will run.
            self.shared.state.store(State::Closed as u8, Ordering::SeqCst);
        } else {
            self.shared.state.store(State::Closing as u8, Ordering::SeqCst);
        }
    }

    /// The configured maximum payload size (the 4-byte prefix is excluded).
    pub fn max_message_size(&self) -> usize {
        self.shared.max_message_size
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        State::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Local endpoint, available once the socket is established.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.endpoints.get().map(|(local, _)| *local)
    }

    /// Remote endpoint, available once the socket is established.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.endpoints.get().map(|(_, peer)| *peer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("peer_addr", &self.peer_addr())
            .field("max_message_size", &self.max_message_size())
            .finish()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;
type ClosedHandler = Box<dyn FnOnce() + Send>;

/// Driver task: resolves the socket, pumps frames both ways, and finishes
/// the shutdown sequence. Every exit path funnels to the single close
/// notification at the end.
async fn drive(
    shared: Arc<Shared>,
    source: Source,
    outgoing_rx: mpsc::UnboundedReceiver<Bytes>,
    on_message: MessageHandler,
    on_closed: ClosedHandler,
) {
    let stream = match source {
        Source::Accepted(stream) => Ok(stream),
        Source::Connecting(result_rx) => tokio::select! {
            _ = shared.shutdown.cancelled() => {
                Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "closed before connect completed",
                ))
            }
            result = result_rx => result.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::Other, "reactor stopped"))
            }),
        },
    };

    match stream {
        Ok(stream) => {
            if let (Ok(local), Ok(peer)) = (stream.local_addr(), stream.peer_addr()) {
                let _ = shared.endpoints.set((local, peer));
            }
            shared.state.store(State::Open as u8, Ordering::SeqCst);
            pump(&shared, stream, outgoing_rx, on_message).await;
        }
        Err(e) => {
            debug!(error = %e, "connect failed");
        }
    }

    shared.shutdown.cancel();
    shared.state.store(State::Closed as u8, Ordering::SeqCst);
    shared.region.post(on_closed);
}

/// Run the read loop and the writer task until either side finishes.
async fn pump(
    shared: &Arc<Shared>,
    stream: TcpStream,
    mut outgoing_rx: mpsc::UnboundedReceiver<Bytes>,
    on_message: MessageHandler,
) {
    let framed = Framed::new(stream, FrameCodec::new(shared.max_message_size));
    let (mut sink, mut frames) = framed.split();

    // Single writer: one write in flight, queue order preserved. Exiting for
    // any reason (send error, queue closed by the last handle dropping, or
    // cancellation) tears down the whole connection.
    let shutdown = shared.shutdown.clone();
    let writer = shared.region.handle().spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = outgoing_rx.recv() => match next {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            debug!(error = %e, "write failed");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        shutdown.cancel();
    });

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            next = frames.next() => match next {
                Some(Ok(payload)) => {
                    let on_message = on_message.clone();
                    shared.region.post(move || on_message(payload));
                }
                Some(Err(Error::OversizedFrame { declared, max })) => {
                    warn!(declared, max, "peer violated the frame size limit");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break;
                }
                None => {
                    debug!("peer closed the connection");
                    break;
                }
            },
        }
    }

    shared.state.store(State::Closing as u8, Ordering::SeqCst);
    shared.shutdown.cancel();
    let _ = writer.await;
}
