//! Per-connection settings
//!
//! Defaults mirror a plain line-based chat: 1 KiB reads, no line length
//! limit and no idle timeout.

use std::time::Duration;

/// Bytes requested from the socket per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Messages queued per client before it counts as too slow
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Longest a single socket write may stall
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings applied to every accepted connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Read buffer size handed to the line framer (at least 1)
    pub read_chunk_size: usize,
    /// Capacity of the client's outbound queue (at least 1)
    pub outbound_capacity: usize,
    /// Write stall limit; the connection is dropped past it
    pub write_timeout: Duration,
    /// Disconnect clients that send no bytes at all for this long
    pub idle_timeout: Option<Duration>,
    /// Reject lines longer than this many bytes
    pub max_line_length: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: None,
            max_line_length: None,
        }
    }
}
