//! The Transmission Control Block: every piece of state a single connection
//! needs to remember between segments.
//!
//! Unlike the reference this is distilled from, the TCB is not a
//! process-global static — it is a plain value owned by a [`Connection`]
//! (see `tcp::mod`), which is what lets tests construct several independent
//! connections against fake transports without `unsafe` or a lock.

use std::net::Ipv4Addr;

use crate::constants::BUFFER_SIZE;
use crate::state::State;

/// The flag bits of the most recently processed segment, kept only so the
/// next segment can be compared against it to recognize a retransmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PrevFlags {
    pub syn: bool,
    pub fin: bool,
}

/// The fixed-capacity circular buffer backing the in-order receive path.
/// Bytes enter at `(start + size) % capacity` and leave from `start`; `psh`
/// counts how many bytes at the head carry a push commitment and must never
/// exceed `size`.
#[derive(Debug)]
pub(crate) struct RecvBuffer {
    data: Box<[u8]>,
    start: usize,
    size: usize,
    psh: usize,
}

impl RecvBuffer {
    fn new() -> Self {
        RecvBuffer {
            data: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            size: 0,
            psh: 0,
        }
    }

    pub fn free_space(&self) -> usize {
        BUFFER_SIZE - self.size
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn psh_available(&self) -> usize {
        self.psh
    }

    /// Appends `bytes` (already trimmed to fit) at the tail, wrapping at the
    /// end of the backing array in up to two `memcpy`-equivalent chunks.
    pub fn push(&mut self, bytes: &[u8], psh: bool) {
        debug_assert!(bytes.len() <= self.free_space());

        let end = (self.start + self.size) % BUFFER_SIZE;
        let first_chunk = (BUFFER_SIZE - end).min(bytes.len());
        self.data[end..end + first_chunk].copy_from_slice(&bytes[..first_chunk]);
        if first_chunk < bytes.len() {
            let rest = &bytes[first_chunk..];
            self.data[..rest.len()].copy_from_slice(rest);
        }

        self.size += bytes.len();
        if psh {
            self.psh = self.size;
        }
        debug_assert!(self.size <= BUFFER_SIZE);
        debug_assert!(self.psh <= self.size);
    }

    /// Copies up to `maxlen` bytes out of the head of the buffer into a
    /// freshly allocated vector, advancing `start` and shrinking `size`/`psh`
    /// accordingly.
    pub fn take(&mut self, maxlen: usize) -> Vec<u8> {
        let to_copy = maxlen.min(self.size);
        let mut out = Vec::with_capacity(to_copy);

        let first_chunk = (BUFFER_SIZE - self.start).min(to_copy);
        out.extend_from_slice(&self.data[self.start..self.start + first_chunk]);
        if first_chunk < to_copy {
            out.extend_from_slice(&self.data[..to_copy - first_chunk]);
        }

        self.size -= to_copy;
        self.psh = self.psh.saturating_sub(to_copy);
        self.start = (self.start + to_copy) % BUFFER_SIZE;
        out
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.size = 0;
        self.psh = 0;
    }
}

/// Everything the protocol needs to remember about the one connection a
/// [`Connection`] value drives, matching §3 of the design this engine
/// follows: peer identity, the three running sequence-number watermarks,
/// the receive buffer, and enough of the previous segment to recognize a
/// duplicate.
pub(crate) struct Tcb {
    pub state: State,

    pub our_ip: Option<Ipv4Addr>,
    pub their_ip: Option<Ipv4Addr>,
    pub our_port: u16,
    pub their_port: u16,

    /// Next sequence number we place in an outgoing segment's SEQ field.
    pub our_seq: u32,
    /// Highest contiguous peer byte we have accepted == next ACK value.
    pub their_seq: u32,
    /// ACK-field value that, if echoed back, acknowledges our last send.
    pub expected_ack: u32,
    /// Length of the most recent payload sent and not yet acknowledged.
    pub unacked_data_len: usize,

    pub recv: RecvBuffer,

    pub prev_seq: u32,
    pub prev_flags: PrevFlags,
}

impl Tcb {
    pub fn new() -> Self {
        Tcb {
            state: State::Start,
            our_ip: None,
            their_ip: None,
            our_port: 0,
            their_port: 0,
            our_seq: 0,
            their_seq: 0,
            expected_ack: 0,
            unacked_data_len: 0,
            recv: RecvBuffer::new(),
            prev_seq: 0,
            prev_flags: PrevFlags::default(),
        }
    }

    /// `ack_nr` is always identically `their_seq`: the design note in §9
    /// resolves the reference's two-variable redundancy by keeping only one
    /// field and reading it under either name.
    pub fn ack_nr(&self) -> u32 {
        self.their_seq
    }

    pub fn all_acks_received(&self) -> bool {
        self.our_seq == self.expected_ack
    }

    /// Resets peer identity and buffered state when the FSM collapses to
    /// CLOSED. `our_seq` is fast-forwarded past any outstanding unacked bytes
    /// first, so a connection that reopens does not replay bytes the peer
    /// may already have (partially) seen.
    pub fn clear(&mut self) {
        self.our_seq = self.our_seq.wrapping_add(self.unacked_data_len as u32);
        self.their_seq = 0;
        self.their_ip = None;
        self.their_port = 0;
        self.recv.clear();
        self.unacked_data_len = 0;
    }
}
