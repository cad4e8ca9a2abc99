//! # message-transport
//!
//! Asynchronous, bidirectional, message-oriented transport over TCP.
//!
//! Arbitrary binary messages are framed with a 4-byte big-endian length
//! prefix and moved whole: a [`Connection`] delivers complete payloads to a
//! callback in wire order, a [`Listener`] accepts sockets and hands them
//! over as ready-made connections, and a [`Reactor`] supplies the worker
//! pool everything runs on. Per-entity [`Region`]s serialize callbacks so
//! application state needs no extra locking.
//!
//! ## Example
//! ```rust,no_run
//! use message_transport::{Connection, Listener, Reactor, Region};
//!
//! # fn main() -> message_transport::Result<()> {
//! let reactor = Reactor::new(4)?;
//! let region = Region::new(&reactor);
//!
//! let listener = Listener::listen(
//!     &region,
//!     |connection| {
//!         let replier = connection.clone();
//!         connection
//!             .start(
//!                 move |message| {
//!                     let _ = replier.send(message);
//!                 },
//!                 || println!("server connection closed"),
//!             )
//!             .ok();
//!     },
//!     0,
//! )?;
//!
//! let client = Connection::connect(&region, listener.listening_port());
//! client.start(
//!     |message| println!("echoed {} bytes", message.len()),
//!     || println!("client connection closed"),
//! )?;
//! client.send(&b"hello"[..])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Limits and failure model
//! - Payloads above the configured maximum (default 4 MiB) are rejected
//!   synchronously by [`Connection::send`]; a peer *declaring* an oversized
//!   frame has its connection closed without the payload being read.
//! - All asynchronous I/O failures surface through the close callback,
//!   which fires exactly once per started connection. There is no separate
//!   error callback.
//! - The transport guarantees in-order delivery of whole frames on a single
//!   connection, nothing more: no integrity, no retransmission, no
//!   cross-connection ordering, no multiplexing.

pub mod config;
pub mod core;
pub mod error;
pub mod transport;

pub use config::TransportConfig;
pub use error::{Error, Result};
pub use transport::{Connection, Listener, Message, Port, Reactor, Region, State};
