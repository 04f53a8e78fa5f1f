//! The datagram service this engine is layered on top of.
//!
//! Everything above this trait speaks TCP segments; everything at or below
//! it speaks raw IPv4 datagrams. [`Transport`] is the narrow interface the
//! protocol engine uses to send one segment and receive one segment, mirroring
//! `ip_send`/`ip_receive`/`ip_init`: it may drop, duplicate, or reorder
//! datagrams, but it never hands back a corrupted one without the corruption
//! being detectable (the TCP checksum layer above catches that).
//!
//! [`crate::ip::TunIp`] is the concrete adapter used by the `client`/`server`
//! binaries; tests instead wire two [`Connection`](crate::tcp::Connection)s
//! together through an in-memory pair that implements this same trait.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::err::Error;

/// One inbound datagram, already stripped of its IP header.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: u8,
    pub payload: Vec<u8>,
}

/// The out-of-scope collaborator: an unreliable, single-packet-at-a-time
/// datagram service. Implementations are free to drop, duplicate, or reorder
/// datagrams; they must never silently corrupt one (if they do, it is caught
/// by the TCP checksum, not by this trait).
pub trait Transport {
    /// The local address this transport is bound to, or `None` if
    /// initialization (the out-of-scope `ip_init()`) has not produced one yet.
    fn local_addr(&self) -> Option<Ipv4Addr>;

    /// Hands `payload` (a complete TCP segment: header + data, no IP header)
    /// to the datagram service for delivery to `dst`, tagged with IP protocol
    /// number `protocol`. Returns the number of payload bytes the lower layer
    /// accepted, or an error if the send primitive itself refused.
    fn send(&mut self, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Result<usize, Error>;

    /// Waits up to `timeout` for one inbound datagram. Returns `Ok(None)` if
    /// nothing arrived in that window (the caller is expected to re-check its
    /// own deadline and call again), or an error on lower-layer failure.
    /// Callers further reject datagrams whose `protocol` is not TCP and whose
    /// checksum does not verify; this trait only strips the IP header.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, Error>;
}
