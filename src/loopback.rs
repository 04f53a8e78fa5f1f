//! An in-memory stand-in for the datagram service, used to drive two
//! [`Connection`](crate::Connection)s against each other without a real
//! TUN device. Each endpoint is one [`Loopback`]; [`Loopback::pair`] wires
//! two of them together through a channel in each direction.
//!
//! Deliberate packet loss and duplication — the lossy behaviors of a real
//! unreliable datagram service this engine actually has to tolerate — are
//! injected on the sending side via a [`Fault`]-returning closure, so a
//! test can script exactly which segment gets dropped or duplicated
//! without racing against the two connections' own timing. Reordering is
//! not modeled: this design requires in-order arrival and relies on
//! retransmission rather than reassembly to recover from it.

use std::net::Ipv4Addr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::err::Error;
use crate::transport::{Datagram, Transport};

/// What a fault-injection closure decides to do with one outgoing datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Deliver the datagram normally.
    Pass,
    /// Silently discard it, as an unreliable datagram service is free to do.
    Drop,
    /// Deliver it twice.
    Duplicate,
}

type FaultFn = dyn FnMut(&Datagram) -> Fault + Send;

pub struct Loopback {
    local_addr: Ipv4Addr,
    tx: Sender<Datagram>,
    rx: Receiver<Datagram>,
    fault: Arc<Mutex<FaultFn>>,
}

impl Loopback {
    /// Wires up two endpoints bound to `a_addr` and `b_addr`, each able to
    /// send to and receive from the other. Neither side injects faults
    /// until [`Self::set_fault`] is called.
    pub fn pair(a_addr: Ipv4Addr, b_addr: Ipv4Addr) -> (Loopback, Loopback) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel();

        let a = Loopback {
            local_addr: a_addr,
            tx: a_to_b_tx,
            rx: b_to_a_rx,
            fault: Arc::new(Mutex::new(|_: &Datagram| Fault::Pass)),
        };
        let b = Loopback {
            local_addr: b_addr,
            tx: b_to_a_tx,
            rx: a_to_b_rx,
            fault: Arc::new(Mutex::new(|_: &Datagram| Fault::Pass)),
        };
        (a, b)
    }

    /// Installs a closure that decides the fate of every datagram this
    /// endpoint subsequently sends. Replaces any previously installed
    /// closure.
    pub fn set_fault(&mut self, f: impl FnMut(&Datagram) -> Fault + Send + 'static) {
        self.fault = Arc::new(Mutex::new(f));
    }
}

impl Transport for Loopback {
    fn local_addr(&self) -> Option<Ipv4Addr> {
        Some(self.local_addr)
    }

    fn send(&mut self, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Result<usize, Error> {
        let datagram = Datagram {
            src_ip: self.local_addr,
            dst_ip: dst,
            protocol,
            payload: payload.to_vec(),
        };

        let verdict = (self.fault.lock().unwrap())(&datagram);
        match verdict {
            Fault::Drop => {}
            Fault::Pass => {
                let _ = self.tx.send(datagram);
            }
            Fault::Duplicate => {
                let _ = self.tx.send(datagram.clone());
                let _ = self.tx.send(datagram);
            }
        }
        Ok(payload.len())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, Error> {
        match self.rx.recv_timeout(timeout) {
            Ok(d) => Ok(Some(d)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer transport was dropped",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_sent_on_one_end_arrives_on_the_other() {
        let (mut a, mut b) = Loopback::pair(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        a.send(Ipv4Addr::new(10, 0, 0, 2), 6, b"hello").unwrap();

        let received = b.recv(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(received.src_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(received.payload, b"hello");
    }

    #[test]
    fn recv_times_out_with_nothing_pending() {
        let (_a, mut b) = Loopback::pair(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        assert!(b.recv(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn dropped_datagram_never_arrives() {
        let (mut a, mut b) = Loopback::pair(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        a.set_fault(|_| Fault::Drop);
        a.send(Ipv4Addr::new(10, 0, 0, 2), 6, b"lost").unwrap();
        assert!(b.recv(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn duplicated_datagram_arrives_twice() {
        let (mut a, mut b) = Loopback::pair(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        a.set_fault(|_| Fault::Duplicate);
        a.send(Ipv4Addr::new(10, 0, 0, 2), 6, b"twice").unwrap();
        assert!(b.recv(Duration::from_millis(10)).unwrap().is_some());
        assert!(b.recv(Duration::from_millis(10)).unwrap().is_some());
    }
}
