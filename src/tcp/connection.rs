//! The state tier and connection-oriented tier: one [`Connection`] drives
//! one TCB through the handshake, data transfer, and teardown against
//! whatever [`Transport`] it was built with.

use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::alarm::Alarm;
use crate::constants::{
    CLIENT_PORT, IP_PROTO_TCP, LISTEN_TIMEOUT, MAX_RETRANSMISSION, MAX_TCP_DATA, READ_TIMEOUT, RTT,
};
use crate::err::Error;
use crate::segment::Segment;
use crate::state::{Event, State};
use crate::tcp::tcb::Tcb;
use crate::transport::Transport;

/// States in which [`Connection::read`] is willing to run at all.
const READABLE_STATES: [State; 6] = [
    State::Established,
    State::FinWait1,
    State::FinWait2,
    State::Closing,
    State::CloseWait,
    State::LastAck,
];

/// Drives a single TCP connection's TCB against a [`Transport`]. One value
/// per process, matching the single-socket premise this engine is built
/// around (§3/§5 of the design).
pub struct Connection<T: Transport> {
    tcb: Tcb,
    transport: T,
    alarm: Alarm,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Connection {
            tcb: Tcb::new(),
            transport,
            alarm: Alarm::new(),
        }
    }

    pub fn state(&self) -> State {
        self.tcb.state
    }

    /// Applies `event` to the TCB, clearing it when the transition demands
    /// it, and logs the `(from, event, to)` triple at debug level whether
    /// or not it actually moved the state.
    fn declare(&mut self, event: Event) {
        let from = self.tcb.state;
        let (to, clear) = from.declare(event);
        if to == from {
            trace!("tcp: {from:?} + {event:?} -> no-op");
        } else {
            debug!("tcp: {from:?} + {event:?} -> {to:?}");
        }
        self.tcb.state = to;
        if clear {
            self.tcb.clear();
        }
    }

    // ---- connection-oriented tier (§4.7) ---------------------------------

    /// Initializes the connection's local address from the transport and
    /// resets the TCB to CLOSED. Idempotent, matching the reference's
    /// `tcp_socket`.
    pub fn open(&mut self) -> Result<(), Error> {
        let addr = self.transport.local_addr().ok_or(Error::NotInitialized)?;
        self.declare(Event::SocketOpen);
        self.tcb.our_ip = Some(addr);
        Ok(())
    }

    /// Actively opens a connection to `(dst, port)`. Requires CLOSED.
    pub fn connect(&mut self, dst: Ipv4Addr, port: u16) -> Result<(), Error> {
        if self.tcb.state != State::Closed {
            return Err(Error::InvalidState(self.tcb.state));
        }

        self.declare(Event::Connect);
        self.tcb.our_port = CLIENT_PORT;
        self.tcb.their_ip = Some(dst);
        self.tcb.their_port = port;

        self.send_syn()
    }

    /// Passively opens on `port` and blocks until a peer completes the
    /// handshake or [`LISTEN_TIMEOUT`] elapses. Returns the peer's address
    /// on success, folding the reference's `*src` out-parameter into the
    /// `Ok` value (§10.5).
    pub fn listen(&mut self, port: u16) -> Result<Ipv4Addr, Error> {
        if self.tcb.state != State::Closed {
            return Err(Error::InvalidState(self.tcb.state));
        }

        self.tcb.our_port = port;
        self.tcb.their_port = 0;
        self.declare(Event::Listen);

        let prior = self.alarm.arm(LISTEN_TIMEOUT);
        let result = loop {
            if self.tcb.state == State::Established {
                break Ok(());
            }
            if self.alarm.fired() {
                break Err(Error::TimedOut);
            }

            if let Err(e) = self.do_packet(self.alarm.remaining()) {
                break Err(e);
            }

            if self.tcb.state == State::SynReceived {
                break self.send_syn();
            }
        };
        self.alarm.restore(prior);

        result?;
        self.tcb.their_ip.ok_or(Error::NotInitialized)
    }

    /// Reads up to `maxlen` bytes into `buf`. `Ok(0)` means the peer has
    /// sent a FIN and the receive buffer is drained (EOF); an empty buffer
    /// with the connection already CLOSED is an error instead.
    pub fn read(&mut self, buf: &mut [u8], maxlen: usize) -> Result<usize, Error> {
        if !READABLE_STATES.contains(&self.tcb.state) && self.tcb.state != State::Closed {
            return Err(Error::InvalidState(self.tcb.state));
        }

        if self.tcb.recv.len() == 0 {
            match self.tcb.state {
                State::Closing | State::CloseWait | State::LastAck => return Ok(0),
                State::Closed => return Err(Error::InvalidState(self.tcb.state)),
                _ => {}
            }
        }

        if matches!(
            self.tcb.state,
            State::Established | State::FinWait1 | State::FinWait2
        ) {
            self.receive_new_data(maxlen)?;
        }

        Ok(self.deliver_received_bytes(buf, maxlen))
    }

    /// Blocks, bounded by [`READ_TIMEOUT`], until either a push-flagged
    /// chunk is available, the buffer holds `min(maxlen, BUFFER_SIZE)`
    /// bytes, or the peer's FIN has moved us out of the readable-for-more
    /// states. Mirrors `receive_new_data`.
    fn receive_new_data(&mut self, maxlen: usize) -> Result<(), Error> {
        let bytes_to_read = maxlen.min(crate::constants::BUFFER_SIZE);

        let prior = self.alarm.arm(READ_TIMEOUT);
        let result = loop {
            if self.alarm.fired() {
                break Ok(());
            }
            if self.tcb.recv.psh_available() > 0 || self.tcb.recv.len() >= bytes_to_read {
                break Ok(());
            }
            if matches!(
                self.tcb.state,
                State::Closed | State::CloseWait | State::LastAck
            ) {
                break Ok(());
            }
            if let Err(e) = self.do_packet(self.alarm.remaining()) {
                break Err(e);
            }
        };
        self.alarm.restore(prior);
        result
    }

    fn deliver_received_bytes(&mut self, buf: &mut [u8], maxlen: usize) -> usize {
        let bytes = self.tcb.recv.take(maxlen);
        let n = bytes.len();
        buf[..n].copy_from_slice(&bytes);
        n
    }

    /// Writes `buf`, chunked into segments of at most [`MAX_TCP_DATA`]
    /// bytes, each sent reliably via [`Self::send_data`]. Requires
    /// ESTABLISHED.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if self.tcb.state != State::Established {
            return Err(Error::InvalidState(self.tcb.state));
        }
        if buf.is_empty() {
            return Err(Error::EmptyWrite);
        }

        let mut sent = 0;
        while sent < buf.len() {
            let chunk_end = (sent + MAX_TCP_DATA).min(buf.len());
            match self.send_data(&buf[sent..chunk_end]) {
                Ok(n) => sent += n,
                Err(e) => {
                    if sent == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }

        if sent == 0 {
            Err(Error::EmptyWrite)
        } else {
            Ok(sent)
        }
    }

    /// Initiates orderly teardown. Requires ESTABLISHED or CLOSE_WAIT.
    pub fn close(&mut self) -> Result<(), Error> {
        if !matches!(self.tcb.state, State::Established | State::CloseWait) {
            return Err(Error::InvalidState(self.tcb.state));
        }

        self.declare(Event::Close);
        self.send_fin()
    }

    // ---- state tier: dispatcher (§4.3) -----------------------------------

    /// Pulls one segment via the transport (bounded by `timeout`),
    /// validates it, and dispatches it to the flag handlers. A timed-out
    /// poll, a non-TCP datagram, or a segment that fails validation is a
    /// silent no-op, exactly as in the reference.
    fn do_packet(&mut self, timeout: Duration) -> Result<(), Error> {
        let datagram = match self.transport.recv(timeout)? {
            Some(d) => d,
            None => return Ok(()),
        };

        if datagram.protocol != IP_PROTO_TCP {
            trace!("tcp: dropping non-tcp datagram (protocol {})", datagram.protocol);
            return Ok(());
        }

        let segment = match Segment::parse(datagram.src_ip, datagram.dst_ip, &datagram.payload) {
            Ok(s) => s,
            Err(e) => {
                trace!("tcp: dropping unparseable segment: {e}");
                return Ok(());
            }
        };
        let header = segment.header.clone();

        if self.tcb.state == State::Listen && header.syn && !header.ack {
            self.tcb.their_port = header.source_port;
        }

        if !self.packet_is_valid(&segment) {
            trace!("tcp: rejecting segment from port {}", header.source_port);
            return Ok(());
        }

        if header.destination_port != self.tcb.our_port || header.source_port != self.tcb.their_port
        {
            return Ok(());
        }

        self.handle_ack(&segment);
        self.handle_data(&segment)?;
        self.handle_syn(&segment, datagram.src_ip);
        self.handle_fin(&segment)?;

        self.tcb.prev_seq = header.sequence_number;
        self.tcb.prev_flags = crate::tcp::tcb::PrevFlags {
            syn: header.syn,
            fin: header.fin,
        };

        Ok(())
    }

    // ---- packet validation (§4.4) -----------------------------------------

    fn packet_is_valid(&self, segment: &Segment) -> bool {
        let header = &segment.header;

        if header.destination_port != self.tcb.our_port || header.source_port != self.tcb.their_port
        {
            return false;
        }

        if self.tcb.state == State::Listen && (!header.syn || header.ack) {
            return false;
        }

        if self.tcb.state == State::SynSent {
            if !header.ack || !header.syn {
                return false;
            }
            if self
                .tcb
                .expected_ack
                .wrapping_sub(header.acknowledgment_number)
                > MAX_TCP_DATA as u32
            {
                return false;
            }
        }

        if !header.syn {
            if !header.ack {
                return false;
            }
            if self
                .tcb
                .expected_ack
                .wrapping_sub(header.acknowledgment_number)
                > MAX_TCP_DATA as u32
            {
                return false;
            }
        }

        if (header.syn || header.fin) && segment.data_len() > 0 {
            return false;
        }

        if segment.data_len() > MAX_TCP_DATA {
            return false;
        }

        true
    }

    // ---- flag handlers (§4.5) --------------------------------------------

    fn handle_ack(&mut self, segment: &Segment) {
        let header = &segment.header;
        if !header.ack {
            return;
        }

        if header.acknowledgment_number == self.tcb.expected_ack {
            self.tcb.our_seq = header.acknowledgment_number;
            self.tcb.unacked_data_len = 0;

            if self.tcb.state == State::Established {
                return;
            }
            if matches!(
                self.tcb.state,
                State::SynAckSent | State::FinWait1 | State::LastAck | State::Closing
            ) {
                self.declare(Event::AckReceived);
            }
        }
    }

    fn handle_data(&mut self, segment: &Segment) -> Result<(), Error> {
        let data_size = segment.data_len();
        let free_space = self.tcb.recv.free_space();

        if data_size == 0 || free_space == 0 {
            return Ok(());
        }

        let seq = segment.header.sequence_number;
        let fresh_start = self.tcb.their_seq.wrapping_sub(seq);
        let fresh_size = (data_size as u32).wrapping_sub(fresh_start);

        if fresh_size > 0 && fresh_start <= MAX_TCP_DATA as u32 {
            let size = (free_space as u32).min(fresh_size) as usize;
            let fresh_start = (fresh_start as usize).min(segment.payload.len());
            let fresh_end = (fresh_start + size).min(segment.payload.len());

            self.tcb.their_seq = self.tcb.their_seq.wrapping_add(size as u32);
            match self.send_ack() {
                Ok(_) => {}
                Err(e) => {
                    self.tcb.their_seq = self.tcb.their_seq.wrapping_sub(size as u32);
                    return Err(e);
                }
            }

            self.tcb
                .recv
                .push(&segment.payload[fresh_start..fresh_end], segment.header.psh);
        } else if self.tcb.prev_seq == seq {
            self.send_ack()?;
        }

        debug_assert!(self.tcb.recv.len() <= crate::constants::BUFFER_SIZE);
        Ok(())
    }

    fn handle_syn(&mut self, segment: &Segment, their_ip: Ipv4Addr) {
        let header = &segment.header;
        if !header.syn {
            return;
        }

        match self.tcb.state {
            State::Listen => {
                if !header.ack {
                    self.tcb.their_ip = Some(their_ip);
                    self.tcb.their_seq = header.sequence_number.wrapping_add(1);
                    self.declare(Event::SynReceived);
                }
            }
            State::SynSent => {
                if self.tcb.all_acks_received() {
                    self.declare(Event::SynAckReceived);
                    self.tcb.their_seq = header.sequence_number.wrapping_add(1);
                    let _ = self.send_ack();
                }
            }
            State::Established => {
                if self.tcb.prev_seq == header.sequence_number && self.tcb.prev_flags.syn {
                    let _ = self.send_ack();
                }
            }
            _ => {}
        }
    }

    fn handle_fin(&mut self, segment: &Segment) -> Result<(), Error> {
        let header = &segment.header;
        if !header.fin {
            return Ok(());
        }

        match self.tcb.state {
            State::Established | State::FinWait1 | State::FinWait2 => {
                self.tcb.their_seq = header.sequence_number.wrapping_add(1);
                self.send_ack()?;
                self.declare(Event::FinReceived);
            }
            State::CloseWait | State::LastAck => {
                if self.tcb.prev_seq == header.sequence_number && self.tcb.prev_flags.fin {
                    self.send_ack()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- reliable senders (§4.6) ------------------------------------------

    fn send_segment(&mut self, segment: Segment) -> Result<usize, Error> {
        let their_ip = self.tcb.their_ip.ok_or(Error::NotInitialized)?;
        let bytes = segment.to_bytes(
            self.tcb.our_ip.ok_or(Error::NotInitialized)?,
            their_ip,
        )?;
        self.transport.send(their_ip, IP_PROTO_TCP, &bytes)
    }

    fn send_data(&mut self, payload: &[u8]) -> Result<usize, Error> {
        for attempt in 1..=MAX_RETRANSMISSION {
            debug!("tcp: send_data attempt {attempt}/{MAX_RETRANSMISSION}");

            let segment = Segment::new(
                self.tcb.our_port,
                self.tcb.their_port,
                self.tcb.our_seq,
                self.tcb.ack_nr(),
            )
            .with_payload(payload)
            .psh();
            let sent = self.send_segment(segment)?;

            self.tcb.expected_ack = self.tcb.our_seq.wrapping_add(sent as u32);
            self.tcb.unacked_data_len = sent;

            if self.wait_for_ack() {
                return Ok(sent);
            }
        }
        Err(Error::PeerDead(MAX_RETRANSMISSION))
    }

    fn send_syn(&mut self) -> Result<(), Error> {
        let also_ack = self.tcb.state != State::Connecting;

        for attempt in 1..=MAX_RETRANSMISSION {
            debug!("tcp: send_syn attempt {attempt}/{MAX_RETRANSMISSION}");

            let mut segment = Segment::new(
                self.tcb.our_port,
                self.tcb.their_port,
                self.tcb.our_seq,
                self.tcb.ack_nr(),
            )
            .syn()
            .psh();
            if !also_ack {
                segment = segment.without_ack();
            }
            self.send_segment(segment)?;

            self.tcb.expected_ack = self.tcb.our_seq.wrapping_add(1);
            if also_ack {
                self.declare(Event::SynAckSent);
            } else {
                self.declare(Event::SynSent);
            }

            if self.wait_for_ack() && self.tcb.state == State::Established {
                return Ok(());
            }
            self.declare(Event::AckTimeOut);
        }

        self.declare(Event::PartnerDead);
        Err(Error::PeerDead(MAX_RETRANSMISSION))
    }

    fn send_fin(&mut self) -> Result<(), Error> {
        for attempt in 1..=MAX_RETRANSMISSION {
            debug!("tcp: send_fin attempt {attempt}/{MAX_RETRANSMISSION}");

            let segment = Segment::new(
                self.tcb.our_port,
                self.tcb.their_port,
                self.tcb.our_seq,
                self.tcb.ack_nr(),
            )
            .fin()
            .psh();
            self.send_segment(segment)?;
            self.tcb.expected_ack = self.tcb.our_seq.wrapping_add(1);

            if self.wait_for_ack() && self.tcb.state != State::FinWait1 {
                return Ok(());
            }
        }

        self.declare(Event::PartnerDead);
        Err(Error::PeerDead(MAX_RETRANSMISSION))
    }

    fn send_ack(&mut self) -> Result<usize, Error> {
        let segment = Segment::new(
            self.tcb.our_port,
            self.tcb.their_port,
            self.tcb.our_seq,
            self.tcb.ack_nr(),
        )
        .psh();
        self.send_segment(segment)
    }

    /// Arms a fresh [`RTT`] alarm nested inside whatever alarm the caller
    /// already had running, polls `do_packet` until either it fires or
    /// every outstanding byte is acknowledged, then restores the caller's
    /// alarm. Lower-layer errors during the wait are logged and treated as
    /// a missed poll rather than aborting the wait, since a single failed
    /// receive should not be fatal to a retry loop that will try again.
    fn wait_for_ack(&mut self) -> bool {
        let prior = self.alarm.arm(RTT);

        while !self.alarm.fired() && !self.tcb.all_acks_received() {
            let timeout = self.alarm.remaining();
            if let Err(e) = self.do_packet(timeout) {
                warn!("tcp: wait_for_ack: {e}");
            }
        }

        self.alarm.restore(prior);
        self.tcb.all_acks_received()
    }
}
