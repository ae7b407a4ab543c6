//! DHCPv4 server core: message-type dispatch over
//! DISCOVER/REQUEST/DECLINE/RELEASE/INFORM.
//!
//! Grounded on `hr-dhcp::state_machine::handle_dhcp_packet` and its helpers,
//! restructured to a pure value-in/value-out shape: no socket, no file I/O,
//! `now` supplied by the caller.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::config::DhcpV4Config;
use crate::error::ConfigError;
use crate::v4::lease::{Lease, Pool};
use crate::v4::options::{self, DhcpOption, OptionValue};
use crate::v4::packet::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Send via the relay agent that forwarded the request.
    Relay(Ipv4Addr),
    /// Client has no usable address yet; must be link-layer broadcast.
    Broadcast,
    /// Unicast to the address the client will hold.
    Unicast(Ipv4Addr),
}

#[derive(Debug, Clone)]
pub struct Response {
    pub bytes: Vec<u8>,
    pub destination: Destination,
}

#[derive(Debug, Clone)]
pub struct State4 {
    pub config: DhcpV4Config,
    pub pool: Pool,
}

pub fn init_v4(config: DhcpV4Config) -> Result<State4, ConfigError> {
    config.validate()?;
    let pool = Pool::new(config.range_start, config.range_end);
    Ok(State4 { config, pool })
}

pub fn get_leases(state: &State4) -> Vec<Lease> {
    state.pool.leases().cloned().collect()
}

pub fn sweep(state: &mut State4, now: u64) {
    let freed = state.pool.sweep(now);
    if !freed.is_empty() {
        debug!("v4 sweep released {} expired lease(s)", freed.len());
    }
}

fn server_identity(config: &DhcpV4Config) -> Ipv4Addr {
    config.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED)
}

/// Destination hint: relay if `giaddr` is set, otherwise broadcast unless
/// the client already has a usable address and didn't ask for broadcast.
fn destination_for(request: &Message, reply_addr: Ipv4Addr) -> Destination {
    if request.giaddr != Ipv4Addr::UNSPECIFIED {
        Destination::Relay(request.giaddr)
    } else if request.is_broadcast() || request.ciaddr == Ipv4Addr::UNSPECIFIED {
        Destination::Broadcast
    } else {
        Destination::Unicast(reply_addr)
    }
}

/// Parse `bytes` and dispatch on message type. Malformed input or an
/// ignored message type both yield no responses; the transport is expected
/// to silently drop the datagram either way.
pub fn process_v4(state: &mut State4, bytes: &[u8], now: u64) -> Vec<Response> {
    let request = match Message::parse(bytes) {
        Ok(m) => m,
        Err(e) => {
            debug!("dropping malformed v4 datagram: {}", e);
            return vec![];
        }
    };

    let msg_type = match request.msg_type() {
        Some(t) => t,
        None => return vec![],
    };

    let reply = match msg_type {
        options::DHCPDISCOVER => handle_discover(&request, state, now),
        options::DHCPREQUEST => handle_request(&request, state, now),
        options::DHCPDECLINE => {
            handle_decline(&request, state);
            None
        }
        options::DHCPRELEASE => {
            handle_release(&request, state);
            None
        }
        options::DHCPINFORM => handle_inform(&request, state),
        other => {
            debug!("ignoring v4 message type {}", other);
            None
        }
    };

    match reply {
        Some(reply) => {
            let dest = destination_for(&request, reply.yiaddr);
            vec![Response { bytes: reply.serialize(), destination: dest }]
        }
        None => vec![],
    }
}

fn static_lease_for(config: &DhcpV4Config, client_key: &[u8]) -> Option<(Ipv4Addr, String)> {
    let mac_str = hex::encode(client_key);
    config
        .static_leases
        .iter()
        .find(|s| s.mac.to_lowercase().replace([':', '-'], "") == mac_str)
        .map(|s| (s.ip, s.hostname.clone()))
}

fn handle_discover(request: &Message, state: &mut State4, now: u64) -> Option<Message> {
    let client_key = request.client_key();
    info!("DHCPDISCOVER from {}", hex::encode(&client_key));

    let server_ip = server_identity(&state.config);
    let static_lease = static_lease_for(&state.config, &client_key);

    let lease = if let Some((ip, _)) = static_lease {
        state.pool.confirm(&client_key, ip, now, state.config.lease_time, request.hostname())
    } else {
        match state.pool.allocate(&client_key, request.requested_ip(), now, state.config.lease_time) {
            Ok(lease) => lease,
            Err(_) => {
                warn!("DHCPDISCOVER from {}: pool exhausted", hex::encode(&client_key));
                return None;
            }
        }
    };

    info!("DHCPOFFER {} to {}", lease.ip, hex::encode(&client_key));

    let mut opts = build_standard_options(&state.config, server_ip);
    let hostname = request.hostname().or(static_lease.map(|(_, h)| h).filter(|h| !h.is_empty()));
    if let Some(h) = hostname {
        opts.push(DhcpOption::hostname(&h));
    }

    Some(request.build_reply(options::DHCPOFFER, lease.ip, server_ip, Ipv4Addr::UNSPECIFIED, opts))
}

fn handle_request(request: &Message, state: &mut State4, now: u64) -> Option<Message> {
    let client_key = request.client_key();
    let server_ip = server_identity(&state.config);

    if let Some(requested_server) = request.server_id() {
        if requested_server != server_ip {
            debug!("DHCPREQUEST from {} for a different server", hex::encode(&client_key));
            return None;
        }
    }

    let requested_ip = request.requested_ip().or({
        if request.ciaddr != Ipv4Addr::UNSPECIFIED { Some(request.ciaddr) } else { None }
    });

    let requested_ip = match requested_ip {
        Some(ip) => ip,
        None => return Some(build_nak(request, server_ip, "missing requested address")),
    };

    // RFC 2131 §4.3.2 INIT-REBOOT: no server-id, a requested ip, ciaddr=0.
    // Silence, not NAK, if we hold no record for the client.
    let is_init_reboot =
        request.server_id().is_none() && request.requested_ip().is_some() && request.ciaddr == Ipv4Addr::UNSPECIFIED;
    if is_init_reboot && state.pool.lease_for(&client_key).is_none() {
        debug!("INIT-REBOOT from {} for {}: no record, staying silent", hex::encode(&client_key), requested_ip);
        return None;
    }

    let static_lease = static_lease_for(&state.config, &client_key);
    let is_static = static_lease.as_ref().is_some_and(|(ip, _)| *ip == requested_ip);

    let in_range = u32::from(requested_ip) >= u32::from(state.config.range_start)
        && u32::from(requested_ip) <= u32::from(state.config.range_end);

    if !is_static && !in_range {
        warn!("DHCPNAK: {} requested {} outside the pool", hex::encode(&client_key), requested_ip);
        return Some(build_nak(request, server_ip, "requested address outside of configured range"));
    }

    if let Some(existing) = state
        .pool
        .leases()
        .find(|l| l.ip == requested_ip && l.client_key != client_key)
    {
        if existing.expires_at > now {
            warn!(
                "DHCPNAK: {} requested {} already leased to another client",
                hex::encode(&client_key),
                requested_ip
            );
            return Some(build_nak(request, server_ip, "requested address is in use"));
        }
    }

    let hostname = request.hostname().or(static_lease.map(|(_, h)| h).filter(|h| !h.is_empty()));
    let lease = state.pool.confirm(&client_key, requested_ip, now, state.config.lease_time, hostname.clone());

    info!("DHCPACK {} to {}", lease.ip, hex::encode(&client_key));

    let mut opts = build_standard_options(&state.config, server_ip);
    if let Some(h) = hostname {
        opts.push(DhcpOption::hostname(&h));
    }

    Some(request.build_reply(options::DHCPACK, lease.ip, server_ip, request.ciaddr, opts))
}

fn handle_decline(request: &Message, state: &mut State4) {
    let client_key = request.client_key();
    if let Some(ip) = request.requested_ip() {
        if state.pool.decline(&client_key, ip) {
            info!("DHCPDECLINE from {} for {}", hex::encode(&client_key), ip);
        }
    }
}

fn handle_release(request: &Message, state: &mut State4) {
    let client_key = request.client_key();
    let ip = request.ciaddr;
    if ip != Ipv4Addr::UNSPECIFIED && state.pool.release(&client_key, ip) {
        info!("DHCPRELEASE from {} for {}", hex::encode(&client_key), ip);
    }
}

fn handle_inform(request: &Message, state: &State4) -> Option<Message> {
    let server_ip = server_identity(&state.config);
    let opts = build_standard_options(&state.config, server_ip);
    Some(request.build_reply(options::DHCPACK, Ipv4Addr::UNSPECIFIED, server_ip, request.ciaddr, opts))
}

fn build_nak(request: &Message, server_ip: Ipv4Addr, reason: &str) -> Message {
    request.build_reply(
        options::DHCPNAK,
        Ipv4Addr::UNSPECIFIED,
        server_ip,
        Ipv4Addr::UNSPECIFIED,
        vec![DhcpOption::server_id(server_ip), DhcpOption::message(reason)],
    )
}

/// Options common to OFFER/ACK/INFORM, in RFC 2131 wire order (mask before
/// router when both are present).
fn build_standard_options(config: &DhcpV4Config, server_ip: Ipv4Addr) -> Vec<DhcpOption> {
    let lease = config.lease_time;
    let mut opts = vec![
        DhcpOption::server_id(server_ip),
        DhcpOption::lease_time(lease),
        DhcpOption::subnet_mask(config.netmask),
    ];

    if let Some(gw) = config.gateway {
        opts.push(DhcpOption::router(gw));
    }
    if !config.dns_servers.is_empty() {
        opts.push(DhcpOption::dns_servers(&config.dns_servers));
    }
    if !config.domain.is_empty() {
        opts.push(DhcpOption::domain_name(&config.domain));
    }

    opts.push(DhcpOption::renewal_time(lease / 2));
    opts.push(DhcpOption::rebinding_time(lease / 8 * 7));

    if let Some(gw) = config.gateway {
        let network = u32::from(gw) & u32::from(config.netmask);
        let broadcast = Ipv4Addr::from(network | !u32::from(config.netmask));
        opts.push(DhcpOption::broadcast(broadcast));
    }

    for raw in &config.extra_options {
        opts.push(DhcpOption::new(raw.code as u8, raw.data.clone()));
    }

    opts
}

/// Decode the typed value of a reply option, for tests that want to assert
/// on semantics rather than raw bytes.
pub fn decoded_option(reply: &Message, code: u8) -> Option<OptionValue> {
    let opt = reply.get_option(code)?;
    options::decode_option(code, &opt.data).ok()
}
