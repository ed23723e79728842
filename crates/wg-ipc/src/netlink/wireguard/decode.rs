//! Decoding `WG_CMD_GET_DEVICE` dump replies.
//!
//! Values with the wrong width are skipped, as the kernel never sends them;
//! structural problems (a peer without a public key, an allowed IP with an
//! unknown family or impossible prefix) fail the whole get.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use super::{WgAllowedIpAttr, WgDeviceAttr, WgPeerAttr};
use crate::device::{AllowedIp, Device, Peer, Timespec};
use crate::error::{Error, Result};
use crate::key;
use crate::netlink::attr::{AttrIter, get};

const SOCKADDR_IN_LEN: usize = 16;
const SOCKADDR_IN6_LEN: usize = 28;

/// Parse the top-level attributes of one reply into `device`.
///
/// Peers are appended in order; callers coalesce them once every reply is in.
pub(crate) fn parse_device(data: &[u8], device: &mut Device) -> Result<()> {
    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            t if t == WgDeviceAttr::Ifindex as u16 => {
                if let Ok(index) = get::u32_ne(payload) {
                    device.ifindex = Some(index);
                }
            }
            t if t == WgDeviceAttr::Ifname as u16 => {
                device.name = get::string(payload)?.to_string();
            }
            t if t == WgDeviceAttr::PrivateKey as u16 => {
                if let Some(private) = key::from_slice(payload) {
                    device.set_private_key(Some(private));
                }
            }
            t if t == WgDeviceAttr::ListenPort as u16 => {
                if let Ok(port) = get::u16_ne(payload) {
                    device.listen_port = Some(port);
                }
            }
            t if t == WgDeviceAttr::Fwmark as u16 => {
                if let Ok(mark) = get::u32_ne(payload) {
                    device.fwmark = Some(mark);
                }
            }
            t if t == WgDeviceAttr::Peers as u16 => {
                for (_idx, peer_data) in AttrIter::new(payload) {
                    device.peers.push(parse_peer(peer_data)?);
                }
            }
            // The public key is always derived from the private key.
            _ => {}
        }
    }
    Ok(())
}

/// Parse a single peer's attributes.
fn parse_peer(data: &[u8]) -> Result<Peer> {
    let mut public_key = None;
    let mut peer = Peer::default();

    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            t if t == WgPeerAttr::PublicKey as u16 => {
                public_key = key::from_slice(payload);
            }
            t if t == WgPeerAttr::PresharedKey as u16 => {
                if let Some(psk) = key::from_slice(payload) {
                    peer.preshared_key = (!key::is_zero(&psk)).then_some(psk);
                }
            }
            t if t == WgPeerAttr::Endpoint as u16 => {
                peer.endpoint = parse_sockaddr(payload);
            }
            t if t == WgPeerAttr::PersistentKeepalive as u16 => {
                if let Ok(interval) = get::u16_ne(payload) {
                    peer.persistent_keepalive = Some(interval);
                }
            }
            t if t == WgPeerAttr::LastHandshake as u16 => {
                if let Some(ts) = Timespec::from_ne_bytes(payload) {
                    peer.last_handshake = ts;
                }
            }
            t if t == WgPeerAttr::RxBytes as u16 => {
                if let Ok(rx) = get::u64_ne(payload) {
                    peer.rx_bytes = rx;
                }
            }
            t if t == WgPeerAttr::TxBytes as u16 => {
                if let Ok(tx) = get::u64_ne(payload) {
                    peer.tx_bytes = tx;
                }
            }
            t if t == WgPeerAttr::ProtocolVersion as u16 => {
                if let Ok(version) = get::u32_ne(payload) {
                    peer.protocol_version = Some(version);
                }
            }
            t if t == WgPeerAttr::AllowedIps as u16 => {
                for (_idx, ip_data) in AttrIter::new(payload) {
                    peer.allowed_ips.push(parse_allowed_ip(ip_data)?);
                }
            }
            _ => {}
        }
    }

    peer.public_key =
        public_key.ok_or_else(|| Error::protocol("peer without a public key in reply"))?;
    Ok(peer)
}

/// Parse a single allowed IP's attributes.
fn parse_allowed_ip(data: &[u8]) -> Result<AllowedIp> {
    let mut family: Option<u16> = None;
    let mut addr_bytes: &[u8] = &[];
    let mut cidr: u8 = 0;

    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            t if t == WgAllowedIpAttr::Family as u16 => {
                family = get::u16_ne(payload).ok();
            }
            t if t == WgAllowedIpAttr::IpAddr as u16 => {
                addr_bytes = payload;
            }
            t if t == WgAllowedIpAttr::CidrMask as u16 => {
                if let Ok(mask) = get::u8(payload) {
                    cidr = mask;
                }
            }
            _ => {}
        }
    }

    let addr = match family.map(i32::from) {
        Some(libc::AF_INET) => <[u8; 4]>::try_from(addr_bytes)
            .map(|o| IpAddr::V4(Ipv4Addr::from(o)))
            .ok(),
        Some(libc::AF_INET6) => <[u8; 16]>::try_from(addr_bytes)
            .map(|o| IpAddr::V6(Ipv6Addr::from(o)))
            .ok(),
        _ => None,
    }
    .ok_or_else(|| Error::protocol(format!("allowed IP with bad family {:?}", family)))?;

    AllowedIp::new(addr, cidr)
        .ok_or_else(|| Error::protocol(format!("allowed IP {} with prefix /{}", addr, cidr)))
}

/// Parse a kernel `sockaddr_in`/`sockaddr_in6` endpoint.
///
/// The family and the exact payload length must agree; anything else is
/// not an endpoint and is ignored.
pub(crate) fn parse_sockaddr(data: &[u8]) -> Option<SocketAddr> {
    if data.len() < 4 {
        return None;
    }

    let family = u16::from_ne_bytes([data[0], data[1]]);
    let port = u16::from_be_bytes([data[2], data[3]]);

    match (i32::from(family), data.len()) {
        (libc::AF_INET, SOCKADDR_IN_LEN) => {
            let ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        (libc::AF_INET6, SOCKADDR_IN6_LEN) => {
            let flowinfo = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
            let octets: [u8; 16] = data[8..24].try_into().ok()?;
            let scope_id = u32::from_ne_bytes([data[24], data[25], data[26], data[27]]);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        _ => None,
    }
}
