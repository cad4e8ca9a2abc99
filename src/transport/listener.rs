//! # Listener
//!
//! Binds a TCP acceptor, wraps each accepted socket into a
//! [`Connection`], and hands it to the application's callback on the
//! listener's [`Region`].
//!
//! Binding policy: the requested port is attempted first; if it is `0` or
//! already in use, an OS-assigned ephemeral port is bound instead of
//! failing. [`listening_port`](Listener::listening_port) always reports the
//! port actually open for accepting.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{TransportConfig, ACCEPT_RETRY_DELAY};
use crate::error::Result;
use crate::transport::connection::{Connection, Port};
use crate::transport::reactor::Region;

type NewConnectionHandler = Arc<dyn Fn(Arc<Connection>) + Send + Sync>;

/// A TCP acceptor delivering ready-made [`Connection`]s.
///
/// The listener owns only the acceptor socket; connections it creates are
/// handed off entirely to the callback. Dropping the last handle stops
/// accepting.
pub struct Listener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Listener {
    /// Bind an acceptor and begin accepting immediately.
    ///
    /// `on_new_connection` is invoked on `region` once per accepted socket,
    /// with the connection still in its pre-`start` state; the receiver
    /// decides when to install callbacks and begin reading. Accepted
    /// connections share the listener's region.
    pub fn listen(
        region: &Region,
        on_new_connection: impl Fn(Arc<Connection>) + Send + Sync + 'static,
        requested_port: Port,
    ) -> Result<Arc<Self>> {
        Self::listen_with_config(
            region,
            on_new_connection,
            requested_port,
            &TransportConfig::default(),
        )
    }

    /// Bind an acceptor whose accepted connections use a non-default
    /// message size limit.
    pub fn listen_with_config(
        region: &Region,
        on_new_connection: impl Fn(Arc<Connection>) + Send + Sync + 'static,
        requested_port: Port,
        config: &TransportConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let std_listener = bind_with_fallback(requested_port)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let acceptor = {
            // from_std needs the runtime context for I/O driver registration.
            let _guard = region.handle().enter();
            TcpListener::from_std(std_listener)?
        };
        debug!(port = local_addr.port(), "listening");

        let shutdown = CancellationToken::new();
        region.handle().spawn(accept_loop(
            region.clone(),
            acceptor,
            Arc::new(on_new_connection),
            shutdown.clone(),
            config.clone(),
        ));

        Ok(Arc::new(Self {
            local_addr,
            shutdown,
        }))
    }

    /// The port actually bound, which differs from the requested port when
    /// the ephemeral fallback was taken.
    pub fn listening_port(&self) -> Port {
        self.local_addr.port()
    }

    /// The full bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and release the acceptor socket. Idempotent.
    ///
    /// Connections already handed to the callback are unaffected.
    pub fn stop_listening(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Bind the requested port, falling back to an ephemeral port when it is
/// zero or unavailable. Only a failed ephemeral bind is an error.
fn bind_with_fallback(requested_port: Port) -> Result<StdTcpListener> {
    let any = Ipv4Addr::UNSPECIFIED;
    if requested_port != 0 {
        match StdTcpListener::bind((any, requested_port)) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(
                    port = requested_port,
                    error = %e,
                    "requested port unavailable, falling back to an ephemeral port"
                );
            }
        }
    }
    Ok(StdTcpListener::bind((any, 0))?)
}

/// Accept until cancelled. Transient accept failures are logged and the
/// loop re-arms; cancellation terminates it silently.
async fn accept_loop(
    region: Region,
    acceptor: TcpListener,
    on_new_connection: NewConnectionHandler,
    shutdown: CancellationToken,
    config: TransportConfig,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("listener stopped");
                break;
            }
            accepted = acceptor.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    let connection =
                        Connection::from_accepted_with_config(&region, stream, &config);
                    let on_new_connection = on_new_connection.clone();
                    region.post(move || on_new_connection(connection));
                }
                Err(e) => {
                    warn!(error = %e, "transient accept failure");
                    // Errors like EMFILE persist; pause instead of spinning.
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
        }
    }
}
