//! End-to-end scenarios driving two `Connection`s against each other over
//! the in-memory loopback transport: a full handshake, a large transfer,
//! a duplicated SYN, a dropped data ACK, a dead peer, and an orderly close.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use swtcp::loopback::{Fault, Loopback};
use swtcp::{Connection, Error, State};

const HOST_A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const HOST_B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

#[test]
fn happy_open_write_close() {
    let (a, b) = Loopback::pair(HOST_A, HOST_B);

    let server = thread::spawn(move || -> Result<Vec<u8>, Error> {
        let mut conn = Connection::new(a);
        conn.open()?;
        conn.listen(80)?;

        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf, buf.len())?;
        let first = buf[..n].to_vec();

        let mut trailing = [0u8; 64];
        let eof = conn.read(&mut trailing, trailing.len())?;
        assert_eq!(eof, 0);

        Ok(first)
    });

    let client = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(b);
        conn.open()?;
        conn.connect(HOST_A, 80)?;
        conn.write(b"01234567")?;
        conn.close()?;
        Ok(())
    });

    client.join().unwrap().unwrap();
    let received = server.join().unwrap().unwrap();
    assert_eq!(received, b"01234567");
}

#[test]
fn large_transfer_across_many_segments() {
    let (a, b) = Loopback::pair(HOST_A, HOST_B);

    const LEN: usize = 40_000;
    let payload: Vec<u8> = (0..LEN).map(|i| (i % 8) as u8 + b'0').collect();

    let server = thread::spawn(move || -> Result<Vec<u8>, Error> {
        let mut conn = Connection::new(a);
        conn.open()?;
        conn.listen(80)?;

        let mut received = Vec::with_capacity(LEN);
        let mut buf = [0u8; LEN];
        loop {
            let n = conn.read(&mut buf, buf.len())?;
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        Ok(received)
    });

    let client = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(b);
        conn.open()?;
        conn.connect(HOST_A, 80)?;

        let mut sent = 0;
        while sent < payload.len() {
            sent += conn.write(&payload[sent..])?;
        }
        conn.close()?;
        Ok(())
    });

    client.join().unwrap().unwrap();
    let received = server.join().unwrap().unwrap();
    assert_eq!(received.len(), LEN);
    assert_eq!(received, payload);
}

/// The client's very first SYN is duplicated on the wire before the server
/// ever replies. The server must still reach a single, uncorrupted
/// ESTABLISHED connection despite seeing the SYN twice.
#[test]
fn duplicate_syn_does_not_corrupt_the_handshake() {
    let (a, mut b) = Loopback::pair(HOST_A, HOST_B);

    let already_duplicated = Arc::new(AtomicBool::new(false));
    {
        let already_duplicated = already_duplicated.clone();
        b.set_fault(move |_| {
            if already_duplicated.swap(true, Ordering::SeqCst) {
                Fault::Pass
            } else {
                Fault::Duplicate
            }
        });
    }

    let server = thread::spawn(move || -> Result<Ipv4Addr, Error> {
        let mut conn = Connection::new(a);
        conn.open()?;
        conn.listen(80)
    });

    let client = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(b);
        conn.open()?;
        conn.connect(HOST_A, 80)?;
        assert_eq!(conn.state(), State::Established);
        Ok(())
    });

    client.join().unwrap().unwrap();
    let peer = server.join().unwrap().unwrap();
    assert_eq!(peer, HOST_B);
}

/// The server's first ACK of the client's data segment is dropped, forcing
/// the client to retransmit; the server must recognize the retransmit as a
/// duplicate and re-ACK so the client's `write` eventually succeeds.
#[test]
fn lost_data_ack_is_recovered_by_retransmission() {
    let (mut a, b) = Loopback::pair(HOST_A, HOST_B);

    // The server's first send is its own SYN+ACK during the handshake; the
    // data ACK we actually want to drop is its second send.
    let sends_seen = Arc::new(AtomicUsize::new(0));
    {
        let sends_seen = sends_seen.clone();
        a.set_fault(move |_| {
            if sends_seen.fetch_add(1, Ordering::SeqCst) == 1 {
                Fault::Drop
            } else {
                Fault::Pass
            }
        });
    }

    let server = thread::spawn(move || -> Result<Vec<u8>, Error> {
        let mut conn = Connection::new(a);
        conn.open()?;
        conn.listen(80)?;

        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf, buf.len())?;
        Ok(buf[..n].to_vec())
    });

    let client = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(b);
        conn.open()?;
        conn.connect(HOST_A, 80)?;
        conn.write(b"resend")?;
        Ok(())
    });

    client.join().unwrap().unwrap();
    let received = server.join().unwrap().unwrap();
    assert_eq!(received, b"resend");
}

/// No server ever answers the client's SYN; after exhausting its
/// retransmissions the client must declare the peer dead and return to
/// CLOSED.
#[test]
fn peer_dead_during_handshake() {
    let (_silent_peer, b) = Loopback::pair(HOST_A, HOST_B);

    let mut conn = Connection::new(b);
    conn.open().unwrap();
    let result = conn.connect(HOST_A, 80);

    assert!(matches!(result, Err(Error::PeerDead(_))));
    assert_eq!(conn.state(), State::Closed);
}

/// After an established session the client closes first; the server sees
/// the FIN, drains to EOF, and closes in turn.
#[test]
fn orderly_close_from_receiver_side() {
    let (a, b) = Loopback::pair(HOST_A, HOST_B);

    let server = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(a);
        conn.open()?;
        conn.listen(80)?;

        let mut buf = [0u8; 64];
        loop {
            let n = conn.read(&mut buf, buf.len())?;
            if n == 0 {
                break;
            }
        }
        assert_eq!(conn.state(), State::CloseWait);
        conn.close()?;
        Ok(())
    });

    let client = thread::spawn(move || -> Result<(), Error> {
        let mut conn = Connection::new(b);
        conn.open()?;
        conn.connect(HOST_A, 80)?;
        conn.close()?;

        // The server still owes us its own FIN; keep polling for it so the
        // connection actually reaches CLOSED instead of leaking in FIN_WAIT_2.
        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf, buf.len())?;
        assert_eq!(n, 0);
        assert_eq!(conn.state(), State::Closed);
        Ok(())
    });

    client.join().unwrap().unwrap();
    server.join().unwrap().unwrap();
}
