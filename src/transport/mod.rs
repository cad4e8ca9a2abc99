//! # Transport Layer
//!
//! The asynchronous machinery of the crate.
//!
//! ## Components
//! - **Reactor**: process-wide worker pool servicing all socket I/O
//! - **Region**: serialized execution region, the strand that makes each
//!   connection's and listener's callbacks race-free without locks
//! - **Connection**: framed, bidirectional message channel over one socket
//! - **Listener**: TCP acceptor with ephemeral-port fallback
//!
//! Guarantees are strictly per-connection (in-order frame delivery, FIFO
//! write flushing, exactly-once close notification) and per-listener
//! (accepts delivered in OS order). There is no cross-connection ordering
//! and no protocol-level idle timeout.

pub mod connection;
pub mod listener;
pub mod reactor;

pub use connection::{Connection, Message, Port, State};
pub use listener::Listener;
pub use reactor::{Reactor, Region};
