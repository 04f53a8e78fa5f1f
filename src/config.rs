//! Command-line bootstrap for the `client`/`server` binaries: which TUN
//! device to bring up, the local address/netmask to bind to, and (per
//! binary) the peer to reach or the port to listen on.

use std::net::Ipv4Addr;

use clap::Parser;

/// Arguments shared by both binaries: which TUN device to create and the
/// local address to configure it with.
#[derive(Parser, Debug)]
pub struct Tun {
    /// Name of the TUN device to create (e.g. `tun0`).
    #[arg(long, default_value = "tun0")]
    pub device: String,

    /// IPv4 address to assign to the TUN device.
    #[arg(long)]
    pub addr: Ipv4Addr,

    /// Netmask for the TUN device.
    #[arg(long, default_value = "255.255.255.0")]
    pub netmask: Ipv4Addr,
}

/// `server` binary arguments: bring up a TUN device and passively open on
/// `port`.
#[derive(Parser, Debug)]
pub struct ServerArgs {
    #[command(flatten)]
    pub tun: Tun,

    /// Port to listen on.
    #[arg(long)]
    pub port: u16,
}

/// `client` binary arguments: bring up a TUN device and actively connect
/// to `peer_addr:peer_port`.
#[derive(Parser, Debug)]
pub struct ClientArgs {
    #[command(flatten)]
    pub tun: Tun,

    /// Address of the peer to connect to.
    #[arg(long)]
    pub peer_addr: Ipv4Addr,

    /// Port of the peer to connect to.
    #[arg(long)]
    pub peer_port: u16,
}
