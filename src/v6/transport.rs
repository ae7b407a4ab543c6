//! UDP transport adapter for the v6 core. Owns the socket, the multicast
//! membership, and the clock; the core owns nothing.
//!
//! Grounded on `hr-ipv6::dhcpv6::run_dhcpv6_server`'s socket2 setup and
//! multicast join.

use std::net::{Ipv6Addr, SocketAddrV6};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::v6::server::{process_v6_from, State6};

const SERVER_PORT: u16 = 547;
const DHCPV6_MULTICAST: &str = "ff02::1:2";

fn interface_index(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let path = format!("/sys/class/net/{}/ifindex", name);
    std::fs::read_to_string(&path).ok().and_then(|s| s.trim().parse().ok())
}

pub async fn run_v6_server(state: std::sync::Arc<tokio::sync::Mutex<State6>>) -> Result<()> {
    let interface = state.lock().await.config.interface.clone();

    let sock = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    #[cfg(unix)]
    sock.set_reuse_port(true)?;
    sock.set_nonblocking(true)?;

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, SERVER_PORT, 0, 0);
    sock.bind(&bind_addr.into()).context("failed to bind DHCPv6 server socket")?;

    let multicast: Ipv6Addr = DHCPV6_MULTICAST.parse().unwrap();
    let if_index = interface_index(&interface).unwrap_or(0);
    if let Err(e) = sock.join_multicast_v6(&multicast, if_index) {
        warn!("failed to join DHCPv6 multicast group on {}: {}", interface, e);
    } else {
        info!("joined DHCPv6 multicast group {} on {} (index {})", DHCPV6_MULTICAST, interface, if_index);
    }

    let socket = UdpSocket::from_std(sock.into())?;
    info!("DHCPv6 server listening on port {}", SERVER_PORT);

    let clock = SystemClock;
    let mut buf = [0u8; 1500];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("DHCPv6 recv error: {}", e);
                continue;
            }
        };

        let now = clock.now();
        let peer_ip = match peer.ip() {
            std::net::IpAddr::V6(ip) => Some(ip),
            std::net::IpAddr::V4(_) => None,
        };
        let responses = {
            let mut guard = state.lock().await;
            process_v6_from(&mut guard, &buf[..len], now, peer_ip)
        };

        for response in responses {
            if let Err(e) = socket.send_to(&response.bytes, peer).await {
                warn!("failed to send DHCPv6 reply to {}: {}", peer, e);
            }
        }
    }
}
