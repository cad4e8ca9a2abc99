//! # Configuration
//!
//! Constants and tunable settings for the transport.
//!
//! The wire format itself is fixed (a 4-byte big-endian length prefix); the
//! maximum payload size is a deployment choice and travels through
//! [`TransportConfig`] so both ends of a link can be built with the same
//! limit.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum payload size per frame (4 MiB, prefix excluded).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Size of the length prefix preceding every payload on the wire.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// How long [`Reactor::stop`] waits for in-flight work before forcing
/// worker shutdown.
///
/// [`Reactor::stop`]: crate::transport::reactor::Reactor::stop
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before re-arming the accept loop after a failed accept.
///
/// Accept errors such as EMFILE tend to persist; retrying without a pause
/// would spin a worker thread at full speed.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Tunable transport settings.
///
/// `worker_threads == 0` is interpreted as "one worker" by the reactor;
/// a pool of zero threads would never make progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest payload accepted by `send` and by the inbound decoder.
    pub max_message_size: usize,
    /// Worker threads for a reactor built from this config.
    pub worker_threads: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            worker_threads: num_workers_default(),
        }
    }
}

impl TransportConfig {
    /// Check the configuration for values the wire format cannot carry.
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size == 0 {
            return Err(Error::Config(
                "max_message_size must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max_message_size {} does not fit the 32-bit length prefix",
                self.max_message_size
            )));
        }
        Ok(())
    }
}

fn num_workers_default() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
