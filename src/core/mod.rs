//! # Core Wire Components
//!
//! Low-level framing for the transport.
//!
//! ## Wire Format
//! ```text
//! [Length(4, big-endian)] [Payload(N)]
//! ```
//!
//! The length prefix is the entire framing metadata: no magic bytes, no
//! version field, no checksum. A declared length above the configured
//! maximum is the only decode-time protocol violation; a *wrong but legal*
//! length cannot be detected here and shows up downstream as a frame
//! boundary desynchronization.

pub mod codec;

pub use codec::FrameCodec;
