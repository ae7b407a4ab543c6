//! DHCPv6 server core: message-type dispatch over
//! SOLICIT/REQUEST/CONFIRM/RENEW/REBIND/RELEASE/INFORMATION-REQUEST.
//!
//! Grounded on `hr-ipv6::dhcpv6`'s `handle_solicit`/`handle_request`/
//! `handle_confirm`/`handle_release` shape, restructured to the pure
//! value-in/value-out form the v4 core already uses: no socket, no lease
//! file, `now` supplied by the caller.

use std::net::Ipv6Addr;

use tracing::{debug, info, warn};

use crate::addr::v6_in_prefix;
use crate::config::DhcpV6Config;
use crate::error::ConfigError;
use crate::v6::lease::{Lease, Pool};
use crate::v6::message::{self, Message};
use crate::v6::options::{self, IaAddr, IaNa, RawOption};

#[derive(Debug, Clone)]
pub struct Response {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct State6 {
    pub config: DhcpV6Config,
    pub pool: Pool,
}

pub fn init_v6(config: DhcpV6Config) -> Result<State6, ConfigError> {
    config.validate()?;
    let pool = Pool::new(config.range_start, config.range_end);
    Ok(State6 { config, pool })
}

pub fn get_leases(state: &State6) -> Vec<Lease> {
    state.pool.leases().cloned().collect()
}

pub fn sweep(state: &mut State6, now: u64) {
    let freed = state.pool.sweep(now);
    if !freed.is_empty() {
        debug!("v6 sweep released {} expired lease(s)", freed.len());
    }
}

/// DUID-LLT (type 1) and DUID-LL (type 3) both carry a link-layer address;
/// extract it as a supplemental hint on the lease, same as an EUI-64
/// link-local source address would.
pub fn mac_from_duid(duid: &[u8]) -> Option<[u8; 6]> {
    if duid.len() < 4 {
        return None;
    }
    let duid_type = u16::from_be_bytes([duid[0], duid[1]]);
    let hw_type = u16::from_be_bytes([duid[2], duid[3]]);
    if hw_type != 1 {
        return None;
    }
    let mac = match duid_type {
        1 if duid.len() >= 14 => &duid[8..14],
        3 if duid.len() >= 10 => &duid[4..10],
        _ => return None,
    };
    Some(mac.try_into().unwrap())
}

/// Extract the MAC embedded in an EUI-64 link-local source address
/// (`fe80::/10`, with `ff:fe` at octets 11-12).
pub fn mac_from_link_local(addr: Ipv6Addr) -> Option<[u8; 6]> {
    let o = addr.octets();
    if o[0] != 0xfe || (o[1] & 0xc0) != 0x80 {
        return None;
    }
    if o[11] != 0xff || o[12] != 0xfe {
        return None;
    }
    Some([o[8] ^ 0x02, o[9], o[10], o[13], o[14], o[15]])
}

/// Parse `bytes` and dispatch on message type. `peer` is the source address
/// the datagram arrived from, used only to harvest an EUI-64 MAC hint.
/// Malformed input or an ignored message type both yield no response.
pub fn process_v6(state: &mut State6, bytes: &[u8], now: u64) -> Vec<Response> {
    process_v6_from(state, bytes, now, None)
}

pub fn process_v6_from(state: &mut State6, bytes: &[u8], now: u64, peer: Option<Ipv6Addr>) -> Vec<Response> {
    let request = match Message::parse(bytes) {
        Ok(m) => m,
        Err(e) => {
            debug!("dropping malformed v6 datagram: {}", e);
            return vec![];
        }
    };

    let client_duid = match request.client_duid() {
        Some(d) => d.to_vec(),
        None => {
            debug!("v6 message type {} has no client DUID", request.msg_type);
            return vec![];
        }
    };

    let mac_hint = mac_from_duid(&client_duid).or_else(|| peer.and_then(mac_from_link_local));

    let reply = match request.msg_type {
        message::MSG_SOLICIT => handle_solicit(&request, &client_duid, mac_hint, state, now),
        message::MSG_REQUEST => handle_request_like(&request, &client_duid, mac_hint, state, now, message::MSG_REPLY),
        message::MSG_RENEW => handle_request_like(&request, &client_duid, mac_hint, state, now, message::MSG_REPLY),
        message::MSG_REBIND => handle_request_like(&request, &client_duid, mac_hint, state, now, message::MSG_REPLY),
        message::MSG_CONFIRM => handle_confirm(&request, &client_duid, state),
        message::MSG_RELEASE => handle_release(&request, &client_duid, state),
        message::MSG_INFORMATION_REQUEST => handle_information_request(&request, &client_duid, state),
        other => {
            debug!("ignoring v6 message type {}", other);
            None
        }
    };

    match reply {
        Some(msg) => vec![Response { bytes: msg.serialize() }],
        None => vec![],
    }
}

fn server_id_option(config: &DhcpV6Config) -> RawOption {
    options::duid_option(options::OPT_SERVERID, &config.server_duid)
}

fn client_id_option(duid: &[u8]) -> RawOption {
    options::duid_option(options::OPT_CLIENTID, duid)
}

fn dns_servers_option(config: &DhcpV6Config) -> Option<RawOption> {
    if config.dns_servers.is_empty() {
        None
    } else {
        Some(RawOption::new(options::OPT_DNS_SERVERS, options::encode_dns_servers(&config.dns_servers)))
    }
}

fn ia_na_success(ia_in: &IaNa, lease: &Lease) -> RawOption {
    let t1 = lease.valid_lifetime / 2;
    let t2 = lease.valid_lifetime * 4 / 5;
    let iaaddr = IaAddr {
        address: lease.ip,
        preferred_lifetime: lease.preferred_lifetime,
        valid_lifetime: lease.valid_lifetime,
        options: vec![],
    };
    let ia = IaNa {
        iaid: ia_in.iaid,
        t1,
        t2,
        options: vec![
            RawOption::new(options::OPT_IAADDR, options::encode_iaaddr(&iaaddr)),
            options::status_code_option(options::STATUS_SUCCESS, "address assigned"),
        ],
    };
    RawOption::new(options::OPT_IA_NA, options::encode_ia_na(&ia))
}

fn ia_na_status(iaid: u32, status: u16, msg: &str) -> RawOption {
    let ia = IaNa { iaid, t1: 0, t2: 0, options: vec![options::status_code_option(status, msg)] };
    RawOption::new(options::OPT_IA_NA, options::encode_ia_na(&ia))
}

fn build_reply(msg_type: u8, transaction_id: [u8; 3], options: Vec<RawOption>) -> Message {
    Message { msg_type, transaction_id, options }
}

fn handle_solicit(
    request: &Message,
    client_duid: &[u8],
    mac_hint: Option<[u8; 6]>,
    state: &mut State6,
    now: u64,
) -> Option<Message> {
    let ia_raw = request.get_option(options::OPT_IA_NA)?;
    let ia_in = options::decode_ia_na(&ia_raw.data).ok()?;
    let requested_ip = ia_in.addresses().first().map(|a| a.address);

    let rapid_commit = state.config.rapid_commit && request.get_option(options::OPT_RAPID_COMMIT).is_some();

    // A plain SOLICIT only reserves the address: the client may be talking to
    // several servers at once and is free to never follow up with REQUEST.
    // Only a rapid-commit SOLICIT (or a later REQUEST) actually commits it.
    let result = if rapid_commit {
        state.pool.allocate(client_duid, ia_in.iaid, requested_ip, mac_hint, now, state.config.lease_time)
    } else {
        state.pool.reserve(client_duid, ia_in.iaid, requested_ip, now, state.config.lease_time)
    };

    let lease = match result {
        Ok(lease) => lease,
        Err(_) => {
            warn!("DHCPv6 SOLICIT from {}: pool exhausted", hex::encode(client_duid));
            let opts = vec![
                client_id_option(client_duid),
                server_id_option(&state.config),
                ia_na_status(ia_in.iaid, options::STATUS_NO_ADDRS_AVAIL, "no addresses available"),
            ];
            return Some(build_reply(message::MSG_ADVERTISE, request.transaction_id, opts));
        }
    };

    let (msg_type, mut opts) = if rapid_commit {
        info!("DHCPv6 REPLY (rapid-commit) {} for DUID {}", lease.ip, hex::encode(client_duid));
        (message::MSG_REPLY, vec![RawOption::new(options::OPT_RAPID_COMMIT, vec![])])
    } else {
        info!("DHCPv6 ADVERTISE {} for DUID {}", lease.ip, hex::encode(client_duid));
        (message::MSG_ADVERTISE, vec![])
    };

    opts.push(client_id_option(client_duid));
    opts.push(server_id_option(&state.config));
    opts.push(ia_na_success(&ia_in, &lease));
    if let Some(dns) = dns_servers_option(&state.config) {
        opts.push(dns);
    }

    Some(build_reply(msg_type, request.transaction_id, opts))
}

fn handle_request_like(
    request: &Message,
    client_duid: &[u8],
    mac_hint: Option<[u8; 6]>,
    state: &mut State6,
    now: u64,
    reply_type: u8,
) -> Option<Message> {
    if let Some(server_id) = request.get_option(options::OPT_SERVERID) {
        if server_id.data != state.config.server_duid {
            debug!("DHCPv6 request from {} for a different server", hex::encode(client_duid));
            return None;
        }
    }

    let ia_raw = request.get_option(options::OPT_IA_NA)?;
    let ia_in = options::decode_ia_na(&ia_raw.data).ok()?;
    let requested_ip = ia_in.addresses().first().map(|a| a.address);

    let mut opts = vec![client_id_option(client_duid), server_id_option(&state.config)];

    let renewing = state.pool.lease_for(client_duid, ia_in.iaid).is_some();
    let result = if renewing {
        state.pool.renew(client_duid, ia_in.iaid, now, state.config.lease_time).ok_or(())
    } else {
        state
            .pool
            .allocate(client_duid, ia_in.iaid, requested_ip, mac_hint, now, state.config.lease_time)
            .map_err(|_| ())
    };

    match result {
        Ok(lease) => {
            info!("DHCPv6 REPLY {} for DUID {}", lease.ip, hex::encode(client_duid));
            opts.push(ia_na_success(&ia_in, &lease));
            if let Some(dns) = dns_servers_option(&state.config) {
                opts.push(dns);
            }
        }
        Err(()) => {
            warn!("DHCPv6 REPLY: no binding/address for DUID {}", hex::encode(client_duid));
            opts.push(ia_na_status(ia_in.iaid, options::STATUS_NO_BINDING, "no binding for this IA"));
        }
    }

    Some(build_reply(reply_type, request.transaction_id, opts))
}

/// CONFIRM asks whether the addresses the client already holds are still
/// appropriate for the link it's attached to, regardless of which DUID/IAID
/// they were bound under; every address in every IA_NA must fall inside the
/// configured prefix or the whole CONFIRM is NotOnLink.
fn handle_confirm(request: &Message, client_duid: &[u8], state: &State6) -> Option<Message> {
    let addresses: Vec<Ipv6Addr> = request
        .get_all(options::OPT_IA_NA)
        .filter_map(|opt| options::decode_ia_na(&opt.data).ok())
        .flat_map(|ia| ia.addresses())
        .map(|a| a.address)
        .collect();

    let on_link = addresses.iter().all(|addr| v6_in_prefix(*addr, state.config.prefix, state.config.prefix_length));

    let (status, msg) = if on_link {
        (options::STATUS_SUCCESS, "address confirmed")
    } else {
        (options::STATUS_NOT_ON_LINK, "address not on link")
    };

    let opts = vec![
        client_id_option(client_duid),
        server_id_option(&state.config),
        options::status_code_option(status, msg),
    ];
    Some(build_reply(message::MSG_REPLY, request.transaction_id, opts))
}

fn handle_release(request: &Message, client_duid: &[u8], state: &mut State6) -> Option<Message> {
    let mut freed_any = false;
    for opt in request.get_all(options::OPT_IA_NA) {
        if let Ok(ia) = options::decode_ia_na(&opt.data) {
            if state.pool.release(client_duid, ia.iaid) {
                freed_any = true;
            }
        }
    }
    if freed_any {
        info!("DHCPv6 RELEASE from DUID {}", hex::encode(client_duid));
    }

    let opts = vec![
        client_id_option(client_duid),
        server_id_option(&state.config),
        options::status_code_option(options::STATUS_SUCCESS, "release confirmed"),
    ];
    Some(build_reply(message::MSG_REPLY, request.transaction_id, opts))
}

fn handle_information_request(request: &Message, client_duid: &[u8], state: &State6) -> Option<Message> {
    let mut opts = vec![client_id_option(client_duid), server_id_option(&state.config)];
    if let Some(dns) = dns_servers_option(&state.config) {
        opts.push(dns);
    }
    Some(build_reply(message::MSG_REPLY, request.transaction_id, opts))
}
