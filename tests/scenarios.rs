//! Cross-module scenario tests exercising the public crate API end to end,
//! the way a caller driving the cores over a real transport would.

use std::net::Ipv4Addr;

use dual_dhcp_core::config::{DhcpV4Config, DhcpV6Config};
use dual_dhcp_core::v4::options::{self, DhcpOption};
use dual_dhcp_core::v4::packet::Message as V4Message;
use dual_dhcp_core::v4::server::{init_v4, process_v4};
use dual_dhcp_core::v6::message::{self, Message as V6Message};
use dual_dhcp_core::v6::options::{self as v6options, IaNa, RawOption};
use dual_dhcp_core::v6::server::{get_leases, init_v6, process_v6};

fn v4_config() -> DhcpV4Config {
    DhcpV4Config {
        enabled: true,
        interface: String::new(),
        subnet: Ipv4Addr::new(192, 168, 1, 0),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        range_start: Ipv4Addr::new(192, 168, 1, 100),
        range_end: Ipv4Addr::new(192, 168, 1, 200),
        gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
        dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8)],
        domain: String::new(),
        lease_time: 3600,
        static_leases: vec![],
        extra_options: vec![],
    }
}

fn discover_packet(mac: [u8; 6]) -> Vec<u8> {
    let mut pkt = vec![0u8; 300];
    pkt[0] = 1;
    pkt[1] = 1;
    pkt[2] = 6;
    pkt[28..34].copy_from_slice(&mac);
    pkt[236..240].copy_from_slice(&dual_dhcp_core::v4::packet::MAGIC_COOKIE);
    pkt.truncate(240);
    pkt.extend(options::encode_options(&[DhcpOption::msg_type(options::DHCPDISCOVER)]));
    pkt
}

fn request_packet(mac: [u8; 6], server_id: Ipv4Addr, requested_ip: Ipv4Addr) -> Vec<u8> {
    let mut pkt = vec![0u8; 236];
    pkt[0] = 1;
    pkt[1] = 1;
    pkt[2] = 6;
    pkt[28..34].copy_from_slice(&mac);
    pkt.extend_from_slice(&dual_dhcp_core::v4::packet::MAGIC_COOKIE);
    pkt.extend(options::encode_options(&[
        DhcpOption::msg_type(options::DHCPREQUEST),
        DhcpOption::server_id(server_id),
        DhcpOption::new(options::OPT_REQUESTED_IP, requested_ip.octets().to_vec()),
    ]));
    pkt
}

fn release_packet(mac: [u8; 6], ciaddr: Ipv4Addr) -> Vec<u8> {
    let mut pkt = vec![0u8; 236];
    pkt[0] = 1;
    pkt[1] = 1;
    pkt[2] = 6;
    pkt[12..16].copy_from_slice(&ciaddr.octets());
    pkt[28..34].copy_from_slice(&mac);
    pkt.extend_from_slice(&dual_dhcp_core::v4::packet::MAGIC_COOKIE);
    pkt.extend(options::encode_options(&[DhcpOption::msg_type(options::DHCPRELEASE)]));
    pkt
}

#[test]
fn s1_v4_full_lease_cycle() {
    let mut state = init_v4(v4_config()).unwrap();
    let mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    let offer = process_v4(&mut state, &discover_packet(mac), 0);
    assert_eq!(offer.len(), 1);
    let offer_msg = V4Message::parse(&offer[0].bytes).unwrap();
    assert_eq!(offer_msg.msg_type(), Some(options::DHCPOFFER));
    assert_eq!(offer_msg.yiaddr, Ipv4Addr::new(192, 168, 1, 100));

    let ack = process_v4(
        &mut state,
        &request_packet(mac, Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 100)),
        0,
    );
    assert_eq!(ack.len(), 1);
    let ack_msg = V4Message::parse(&ack[0].bytes).unwrap();
    assert_eq!(ack_msg.msg_type(), Some(options::DHCPACK));
    assert_eq!(ack_msg.yiaddr, Ipv4Addr::new(192, 168, 1, 100));

    assert!(state.pool.used_ips().contains(&Ipv4Addr::new(192, 168, 1, 100)));

    let release = process_v4(&mut state, &release_packet(mac, Ipv4Addr::new(192, 168, 1, 100)), 10);
    assert!(release.is_empty());
    assert!(!state.pool.used_ips().contains(&Ipv4Addr::new(192, 168, 1, 100)));
}

fn v6_config(rapid_commit: bool) -> DhcpV6Config {
    DhcpV6Config {
        enabled: true,
        interface: String::new(),
        prefix: "2001:db8::".parse().unwrap(),
        prefix_length: 64,
        range_start: "2001:db8::1000".parse().unwrap(),
        range_end: "2001:db8::2000".parse().unwrap(),
        dns_servers: vec![],
        lease_time: 3600,
        rapid_commit,
        server_duid: vec![0x00, 0x03, 0x00, 0x01, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
        extra_options: vec![],
    }
}

fn solicit(duid: &[u8], iaid: u32, rapid_commit: bool) -> V6Message {
    let ia = IaNa { iaid, t1: 0, t2: 0, options: vec![] };
    let mut opts = vec![
        RawOption::new(v6options::OPT_CLIENTID, duid.to_vec()),
        RawOption::new(v6options::OPT_IA_NA, v6options::encode_ia_na(&ia)),
    ];
    if rapid_commit {
        opts.push(RawOption::new(v6options::OPT_RAPID_COMMIT, vec![]));
    }
    V6Message { msg_type: message::MSG_SOLICIT, transaction_id: [7, 7, 7], options: opts }
}

#[test]
fn s4_v6_solicit_without_rapid_commit_yields_advertise() {
    let mut state = init_v6(v6_config(false)).unwrap();
    let request = solicit(b"test-client-duid", 12345, false);
    let responses = process_v6(&mut state, &request.serialize(), 0);
    assert_eq!(responses.len(), 1);

    let reply = V6Message::parse(&responses[0].bytes).unwrap();
    assert_eq!(reply.msg_type, message::MSG_ADVERTISE);
    assert_eq!(reply.transaction_id, [7, 7, 7]);
    assert_eq!(reply.get_option(v6options::OPT_CLIENTID).unwrap().data, b"test-client-duid");
    assert_eq!(reply.get_option(v6options::OPT_SERVERID).unwrap().data, state.config.server_duid);

    let ia_raw = reply.get_option(v6options::OPT_IA_NA).unwrap();
    let ia = v6options::decode_ia_na(&ia_raw.data).unwrap();
    assert_eq!(ia.iaid, 12345);
    let addrs = ia.addresses();
    assert_eq!(addrs.len(), 1);
    assert_eq!(addrs[0].address, "2001:db8::1000".parse::<std::net::Ipv6Addr>().unwrap());

    // A plain SOLICIT reserves, it doesn't commit: the offered address must
    // not show up as a used IP or a saved lease yet.
    assert!(!state.pool.used_ips().contains(&addrs[0].address));
    assert!(get_leases(&state).is_empty());
}

#[test]
fn s5_v6_rapid_commit_path() {
    let mut state = init_v6(v6_config(true)).unwrap();
    let request = solicit(b"test-client-duid", 12345, true);
    let responses = process_v6(&mut state, &request.serialize(), 0);
    assert_eq!(responses.len(), 1);

    let reply = V6Message::parse(&responses[0].bytes).unwrap();
    assert_eq!(reply.msg_type, message::MSG_REPLY);
    assert!(reply.get_option(v6options::OPT_RAPID_COMMIT).is_some());

    let expected_ip: std::net::Ipv6Addr = "2001:db8::1000".parse().unwrap();
    assert!(state.pool.used_ips().contains(&expected_ip));

    let leases = get_leases(&state);
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].duid, b"test-client-duid");
    assert_eq!(leases[0].iaid, 12345);
}

#[test]
fn s6_v6_release_after_rapid_commit() {
    let mut state = init_v6(v6_config(true)).unwrap();
    let solicit_msg = solicit(b"test-client-duid", 12345, true);
    let advertise = process_v6(&mut state, &solicit_msg.serialize(), 0);
    let reply = V6Message::parse(&advertise[0].bytes).unwrap();
    let ia_raw = reply.get_option(v6options::OPT_IA_NA).unwrap();
    let ia = v6options::decode_ia_na(&ia_raw.data).unwrap();

    let release = V6Message {
        msg_type: message::MSG_RELEASE,
        transaction_id: [8, 8, 8],
        options: vec![
            RawOption::new(v6options::OPT_CLIENTID, b"test-client-duid".to_vec()),
            RawOption::new(v6options::OPT_SERVERID, state.config.server_duid.clone()),
            RawOption::new(v6options::OPT_IA_NA, v6options::encode_ia_na(&ia)),
        ],
    };

    let responses = process_v6(&mut state, &release.serialize(), 10);
    assert_eq!(responses.len(), 1);
    let reply = V6Message::parse(&responses[0].bytes).unwrap();
    assert_eq!(reply.msg_type, message::MSG_REPLY);
    let status_raw = reply.get_option(v6options::OPT_STATUS_CODE).unwrap();
    let (code, _) = v6options::decode_status_code(&status_raw.data).unwrap();
    assert_eq!(code, v6options::STATUS_SUCCESS);

    assert!(get_leases(&state).is_empty());
}
