//! The connectionless tier: building and parsing individual TCP segments.
//!
//! A [`Segment`] is the transient, stack-sized unit exchanged with the
//! datagram service. Header fields are read/written directly on
//! [`etherparse::TcpHeader`], matching the wire layout (ports, seq, ack,
//! the six flag bits, window, checksum, urgent pointer, all 20 bytes with
//! no options) rather than reinventing a parallel struct.

use std::net::Ipv4Addr;

use etherparse::{TcpHeader, TcpHeaderSlice};

use crate::constants::MAX_TCP_DATA;
use crate::err::Error;

/// Window value advertised on every outgoing segment. This engine never
/// has more than one segment in flight, so a real sliding window is not
/// needed; a constant nonzero value keeps the wire format honest for any
/// conformant peer inspecting it.
const ADVERTISED_WINDOW: u16 = 1;

#[derive(Debug, Clone)]
pub struct Segment {
    pub header: TcpHeader,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32) -> Self {
        let mut header = TcpHeader::new(src_port, dst_port, seq, ADVERTISED_WINDOW);
        header.acknowledgment_number = ack;
        header.ack = true;
        Segment {
            header,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn syn(mut self) -> Self {
        self.header.syn = true;
        self
    }

    pub fn fin(mut self) -> Self {
        self.header.fin = true;
        self
    }

    pub fn psh(mut self) -> Self {
        self.header.psh = true;
        self
    }

    pub fn without_ack(mut self) -> Self {
        self.header.ack = false;
        self
    }

    /// Serializes the segment to wire bytes (header, no options, then
    /// payload), filling in the checksum over the pseudo-header described
    /// by `src_ip`/`dst_ip`.
    pub fn to_bytes(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Result<Vec<u8>, Error> {
        let mut header = self.header.clone();
        header.checksum = header
            .calc_checksum_ipv4_raw(src_ip.octets(), dst_ip.octets(), &self.payload)
            .map_err(|_| Error::BadChecksum)?;

        let mut buf = Vec::with_capacity(header.header_len() as usize + self.payload.len());
        header.write(&mut buf).map_err(Error::Io)?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parses and checksum-verifies a segment received over `src_ip` ->
    /// `dst_ip`. `bytes` is the TCP header plus payload, with no IP header.
    pub fn parse(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, bytes: &[u8]) -> Result<Segment, Error> {
        let slice = TcpHeaderSlice::from_slice(bytes).map_err(|_| Error::BadChecksum)?;
        let header_len = slice.slice().len();
        if bytes.len() < header_len {
            return Err(Error::BadChecksum);
        }
        let payload = &bytes[header_len..];
        if payload.len() > MAX_TCP_DATA {
            return Err(Error::BadChecksum);
        }

        let received_checksum = slice.checksum();
        let mut header = slice.to_header();
        let expected_checksum = header
            .calc_checksum_ipv4_raw(src_ip.octets(), dst_ip.octets(), payload)
            .map_err(|_| Error::BadChecksum)?;
        if expected_checksum != received_checksum {
            return Err(Error::BadChecksum);
        }
        header.checksum = received_checksum;

        Ok(Segment {
            header,
            payload: payload.to_vec(),
        })
    }

    pub fn data_len(&self) -> usize {
        self.payload.len()
    }
}
