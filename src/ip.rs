//! The concrete [`Transport`] adapter used by the `client`/`server` binaries:
//! IPv4 datagrams carried over a Linux TUN device.
//!
//! This is the `ip_init`/`ip_send`/`ip_receive` triplet made concrete. The
//! protocol engine never touches `Tun` directly; it only ever sees
//! [`Transport`].

use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;
use std::time::Duration;

use etherparse::{Ipv4Header, Ipv4HeaderSlice};
use log::trace;
use nix::poll::{poll, PollFd, PollFlags};
use tidy_tuntap::Tun;

use crate::err::Error;
use crate::transport::{Datagram, Transport};

/// Largest single read off the TUN device; comfortably above
/// `MAX_TCP_SEGMENT_LEN` plus the IPv4 header.
const MTU: usize = 1500;

pub struct TunIp {
    tun: Tun,
    our_ip: Ipv4Addr,
    ttl: u8,
}

impl TunIp {
    /// Brings up `name` with `addr`/`netmask` and returns a [`Transport`]
    /// bound to `addr`. Corresponds to `ip_init()` plus device configuration
    /// that a userspace TCP stack would otherwise expect the kernel to do.
    pub fn new(name: &str, addr: Ipv4Addr, netmask: Ipv4Addr) -> Result<Self, Error> {
        let tun = Tun::new(name, false)?;
        tun.set_addr(addr)?;
        tun.set_netmask(netmask)?;
        tun.bring_up()?;

        Ok(TunIp {
            tun,
            our_ip: addr,
            ttl: 64,
        })
    }
}

impl Transport for TunIp {
    fn local_addr(&self) -> Option<Ipv4Addr> {
        Some(self.our_ip)
    }

    fn send(&mut self, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Result<usize, Error> {
        let ip_header = Ipv4Header::new(
            payload.len() as u16,
            self.ttl,
            protocol,
            self.our_ip.octets(),
            dst.octets(),
        );

        let mut buf = Vec::with_capacity(ip_header.header_len() + payload.len());
        ip_header.write(&mut buf).map_err(Error::Io)?;
        buf.extend_from_slice(payload);

        self.tun.write(&buf).map_err(Error::Io)?;
        trace!("ip: sent {} byte datagram to {dst}", payload.len());
        Ok(payload.len())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, Error> {
        let mut pfd = [PollFd::new(self.tun.as_raw_fd(), PollFlags::POLLIN)];
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        if poll(&mut pfd[..], timeout_ms).map_err(std::io::Error::from)? == 0 {
            return Ok(None);
        }

        let mut buf = [0u8; MTU];
        let n = self.tun.read(&mut buf).map_err(Error::Io)?;

        let ip_header = Ipv4HeaderSlice::from_slice(&buf[..n]).map_err(|_| Error::BadChecksum)?;
        let header_len = ip_header.slice().len();
        let protocol = ip_header.protocol();
        let payload = buf[header_len..n].to_vec();

        Ok(Some(Datagram {
            src_ip: ip_header.source_addr(),
            dst_ip: ip_header.destination_addr(),
            protocol,
            payload,
        }))
    }
}
