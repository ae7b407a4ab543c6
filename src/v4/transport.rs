//! UDP transport adapter for the v4 core. The core never spawns threads
//! and never retains references past a call return; this module owns the
//! socket and the clock instead.
//!
//! Grounded on `hr-ipv6::dhcpv6::run_dhcpv6_server`'s socket2-then-tokio
//! setup and `rust-dns-dhcp/src/main.rs`'s per-subsystem `tokio::spawn`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::v4::server::{process_v4, Destination, State4};

const SERVER_PORT: u16 = 67;
const CLIENT_PORT: u16 = 68;

pub async fn run_v4_server(state: std::sync::Arc<tokio::sync::Mutex<State4>>) -> Result<()> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    sock.set_broadcast(true)?;
    sock.set_nonblocking(true)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SERVER_PORT);
    sock.bind(&bind_addr.into()).context("failed to bind DHCPv4 server socket")?;

    let socket = UdpSocket::from_std(sock.into())?;
    info!("DHCPv4 server listening on port {}", SERVER_PORT);

    let clock = SystemClock;
    let mut buf = [0u8; 1500];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("DHCPv4 recv error: {}", e);
                continue;
            }
        };

        let now = clock.now();
        let responses = {
            let mut guard = state.lock().await;
            process_v4(&mut guard, &buf[..len], now)
        };

        for response in responses {
            let dest: SocketAddr = match response.destination {
                Destination::Relay(addr) => SocketAddrV4::new(addr, SERVER_PORT).into(),
                Destination::Broadcast => SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT).into(),
                Destination::Unicast(addr) => SocketAddrV4::new(addr, CLIENT_PORT).into(),
            };
            if let Err(e) = socket.send_to(&response.bytes, dest).await {
                warn!("failed to send DHCPv4 reply to {} (peer {}): {}", dest, peer, e);
            }
        }
    }
}
