//! A minimal, single-connection TCP endpoint layered on top of a raw IPv4
//! datagram service.
//!
//! This is a stop-and-wait engine, not a general-purpose stack: one
//! outstanding segment at a time, no sliding window, no congestion control,
//! no out-of-order reassembly. [`Connection`] owns the whole thing — the
//! finite state machine, the TCB, and the reliable-send/retransmit loop —
//! and is generic over a [`Transport`] so the same engine can run against a
//! real TUN device ([`ip::TunIp`]) or an in-memory loopback used by tests.

pub mod alarm;
pub mod config;
pub mod constants;
pub mod err;
pub mod ip;
pub mod loopback;
pub mod segment;
pub mod state;
mod tcp;
pub mod transport;

pub use alarm::Alarm;
pub use err::Error;
pub use state::{Event, State};
pub use tcp::Connection;
pub use transport::{Datagram, Transport};
