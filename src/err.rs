use crate::state::State;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tun device error: {0}")]
    Tun(#[from] tidy_tuntap::error::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no local address available; call open() first")]
    NotInitialized,

    #[error("operation is not valid while the connection is in state {0:?}")]
    InvalidState(State),

    #[error("segment checksum did not verify")]
    BadChecksum,

    #[error("peer did not respond after {0} retransmissions")]
    PeerDead(u32),

    #[error("timed out waiting for the peer")]
    TimedOut,

    #[error("write() called with an empty buffer")]
    EmptyWrite,
}
