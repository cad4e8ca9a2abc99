//! # Error Types
//!
//! Error handling for the message transport.
//!
//! This module defines all error variants that can occur during transport
//! operations, from low-level I/O errors to framing violations.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and reactor failures
//! - **Size Violations**: outbound messages or inbound frames exceeding the
//!   configured maximum message size
//! - **Lifecycle Errors**: operating on a closed connection, starting a
//!   connection twice
//! - **Configuration Errors**: invalid [`TransportConfig`] values
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! Synchronous validation failures (oversized send, misuse) are returned
//! directly from the calling operation. Asynchronous I/O failures are never
//! surfaced as values of this type to application code; they close the
//! affected connection and are reported through its close callback.
//!
//! [`TransportConfig`]: crate::config::TransportConfig

use std::io;
use thiserror::Error;

/// Primary error type for all transport operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `send` was called with a payload larger than the configured limit.
    /// Reported synchronously; no bytes reach the socket.
    #[error("message of {size} bytes exceeds maximum of {max}")]
    OversizedMessage { size: usize, max: usize },

    /// A peer declared a frame length above the configured limit. The
    /// connection is closed without reading the payload.
    #[error("peer declared frame of {declared} bytes, maximum is {max}")]
    OversizedFrame { declared: usize, max: usize },

    /// The connection has been closed; no further operations are valid.
    #[error("connection closed")]
    ConnectionClosed,

    /// `start` may be called at most once per connection.
    #[error("connection already started")]
    AlreadyStarted,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using the transport [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
