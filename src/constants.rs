//! Fixed sizes and timings for the single-connection engine. None of these
//! are dictated by the wire format; they are tuned for a loopback/TUN
//! deployment rather than a WAN link.

use std::time::Duration;

/// Capacity, in bytes, of the circular receive buffer held by each connection.
pub const BUFFER_SIZE: usize = 8192;

/// Largest payload carried by a single data segment.
pub const MAX_TCP_DATA: usize = 1024;

/// Largest segment (20-byte header, no options, plus payload) handed to the
/// datagram service in one call.
pub const MAX_TCP_SEGMENT_LEN: usize = 20 + MAX_TCP_DATA;

/// Number of send attempts before a peer is declared dead.
pub const MAX_RETRANSMISSION: u32 = 5;

/// Round-trip timeout: how long a reliable sender waits for an ACK before
/// retransmitting.
pub const RTT: Duration = Duration::from_millis(500);

/// Fixed local port used for the active-open (client) side.
pub const CLIENT_PORT: u16 = 34254;

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// How long a passive-open `listen()` call blocks waiting for an incoming
/// SYN before returning [`Error::TimedOut`](crate::err::Error::TimedOut).
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a `read()` call blocks waiting for new data (or a FIN) to
/// arrive before returning [`Error::TimedOut`](crate::err::Error::TimedOut).
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
