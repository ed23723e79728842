//! Encoding `WG_CMD_SET_DEVICE` requests.
//!
//! A configuration rarely fits in one netlink message. [`SetEncoder`] walks
//! the device and yields bounded messages; each one must be sent and
//! acknowledged before the next is requested.
//!
//! Split points:
//!
//! ```text
//! msg 1: IFNAME PRIVKEY PORT FWMARK FLAGS PEERS{ peer0{PK FLAGS .. AIPS{a0 a1}} }
//! msg 2: IFNAME PEERS{ peer0{PK AIPS{a2 a3}} peer1{PK ..} }
//!                      ^ resumed: public key only, then the allowed IPs left over
//! ```

use std::net::SocketAddr;

use super::{
    WG_GENL_VERSION, WgAllowedIpAttr, WgCmd, WgDeviceAttr, WgDeviceFlag, WgPeerAttr, WgPeerFlag,
};
use crate::device::{AllowedIp, Device, Peer};
use crate::error::{Error, Result};
use crate::netlink::builder::{MessageBuilder, NestToken};
use crate::netlink::genl::genl_request_limited;
use crate::netlink::message::{NLM_F_ACK, NLM_F_REQUEST};

/// Largest usable message capacity: nest lengths are 16-bit.
pub const MAX_MESSAGE_CAPACITY: usize = u16::MAX as usize;

/// Default message capacity: a page, capped at 8 KiB.
pub fn default_message_capacity() -> usize {
    // SAFETY: sysconf has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(page).map_or(8192, |page| page.min(8192))
}

/// Outcome of appending one peer.
enum PeerStep {
    /// The peer and all of its remaining allowed IPs are in the message.
    Complete,
    /// The peer header is in; allowed IPs resume in the next message.
    Split,
    /// Nothing of the peer fit.
    NoRoom,
}

/// Splits a [`Device`] into capacity-bounded SET_DEVICE messages.
#[derive(Debug)]
pub struct SetEncoder<'a> {
    device: &'a Device,
    family_id: u16,
    capacity: usize,
    device_fields_sent: bool,
    peer_index: usize,
    /// Index of the first allowed IP of `peer_index` not yet sent, when that
    /// peer was split.
    allowed_ip_index: Option<usize>,
    finished: bool,
}

impl<'a> SetEncoder<'a> {
    /// Create an encoder for `device` with the given family ID and message capacity.
    ///
    /// Capacities above [`MAX_MESSAGE_CAPACITY`] are clamped.
    pub fn new(device: &'a Device, family_id: u16, capacity: usize) -> Self {
        Self {
            device,
            family_id,
            capacity: capacity.min(MAX_MESSAGE_CAPACITY),
            device_fields_sent: false,
            peer_index: 0,
            allowed_ip_index: None,
            finished: false,
        }
    }

    fn cursor(&self) -> (bool, usize, Option<usize>) {
        (self.device_fields_sent, self.peer_index, self.allowed_ip_index)
    }

    /// Build the next message and advance the position.
    fn build(&mut self) -> MessageBuilder {
        let device = self.device;
        let mut msg = genl_request_limited(
            self.family_id,
            NLM_F_REQUEST | NLM_F_ACK,
            WgCmd::SetDevice as u8,
            WG_GENL_VERSION,
            self.capacity,
        );
        msg.append_attr_str(WgDeviceAttr::Ifname as u16, &device.name);

        if !self.device_fields_sent {
            if let Some(key) = device.get_private_key() {
                msg.append_attr(WgDeviceAttr::PrivateKey as u16, key);
            }
            if let Some(port) = device.listen_port {
                msg.append_attr_u16(WgDeviceAttr::ListenPort as u16, port);
            }
            if let Some(mark) = device.fwmark {
                msg.append_attr_u32(WgDeviceAttr::Fwmark as u16, mark);
            }
            if device.replace_peers {
                msg.append_attr_u32(
                    WgDeviceAttr::Flags as u16,
                    WgDeviceFlag::ReplacePeers as u32,
                );
            }
            self.device_fields_sent = true;
        }

        if device.peers.is_empty() {
            self.finished = true;
            return msg;
        }

        let peers_nest = msg.nest_start(WgDeviceAttr::Peers as u16);
        while let Some(peer) = device.peers.get(self.peer_index) {
            match self.append_peer(&mut msg, peer) {
                PeerStep::Complete => {
                    self.peer_index += 1;
                    self.allowed_ip_index = None;
                }
                PeerStep::Split | PeerStep::NoRoom => {
                    msg.nest_end(peers_nest);
                    return msg;
                }
            }
        }
        msg.nest_end(peers_nest);
        self.finished = true;
        msg
    }

    fn append_peer(&mut self, msg: &mut MessageBuilder, peer: &Peer) -> PeerStep {
        let Some(peer_nest) = msg.try_nest_start(0) else {
            return PeerStep::NoRoom;
        };
        if !msg.try_append_attr(WgPeerAttr::PublicKey as u16, &peer.public_key) {
            msg.nest_cancel(peer_nest);
            return PeerStep::NoRoom;
        }

        // A resumed peer only repeats its public key.
        if self.allowed_ip_index.is_none() && !append_peer_fields(msg, peer) {
            msg.nest_cancel(peer_nest);
            return PeerStep::NoRoom;
        }

        if !peer.allowed_ips.is_empty() {
            let start = self.allowed_ip_index.unwrap_or(0);
            let Some(aips_nest) = msg.try_nest_start(WgPeerAttr::AllowedIps as u16) else {
                self.allowed_ip_index = Some(start);
                msg.nest_end(peer_nest);
                return PeerStep::Split;
            };
            for (index, allowed_ip) in peer.allowed_ips.iter().enumerate().skip(start) {
                if !append_allowed_ip(msg, allowed_ip) {
                    self.allowed_ip_index = Some(index);
                    msg.nest_end(aips_nest);
                    msg.nest_end(peer_nest);
                    return PeerStep::Split;
                }
            }
            msg.nest_end(aips_nest);
        }

        msg.nest_end(peer_nest);
        PeerStep::Complete
    }
}

impl Iterator for SetEncoder<'_> {
    type Item = Result<MessageBuilder>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let before = self.cursor();
        let msg = self.build();
        if !self.finished && self.cursor() == before {
            self.finished = true;
            return Some(Err(Error::MessageTooLarge {
                capacity: self.capacity,
            }));
        }
        Some(Ok(msg))
    }
}

/// Flags, preshared key, endpoint and keepalive: sent once per peer.
fn append_peer_fields(msg: &mut MessageBuilder, peer: &Peer) -> bool {
    let mut flags = 0u32;
    if peer.remove {
        flags |= WgPeerFlag::RemoveMe as u32;
    }
    if peer.replace_allowed_ips {
        flags |= WgPeerFlag::ReplaceAllowedIps as u32;
    }

    if let Some(psk) = &peer.preshared_key
        && !msg.try_append_attr(WgPeerAttr::PresharedKey as u16, psk)
    {
        return false;
    }
    if let Some(endpoint) = &peer.endpoint
        && !msg.try_append_attr(WgPeerAttr::Endpoint as u16, &sockaddr_to_bytes(endpoint))
    {
        return false;
    }
    if let Some(interval) = peer.persistent_keepalive
        && !msg.try_append_attr_u16(WgPeerAttr::PersistentKeepalive as u16, interval)
    {
        return false;
    }
    flags == 0 || msg.try_append_attr_u32(WgPeerAttr::Flags as u16, flags)
}

/// Append one allowed-IP entry, or nothing if it does not fit.
fn append_allowed_ip(msg: &mut MessageBuilder, allowed_ip: &AllowedIp) -> bool {
    let Some(nest) = msg.try_nest_start(0) else {
        return false;
    };
    let fits = msg.try_append_attr_u16(WgAllowedIpAttr::Family as u16, allowed_ip.family())
        && msg.try_append_attr(WgAllowedIpAttr::IpAddr as u16, &allowed_ip.addr_bytes())
        && msg.try_append_attr_u8(WgAllowedIpAttr::CidrMask as u16, allowed_ip.cidr);
    finish_nest(msg, nest, fits)
}

fn finish_nest(msg: &mut MessageBuilder, nest: NestToken, keep: bool) -> bool {
    if keep {
        msg.nest_end(nest);
    } else {
        msg.nest_cancel(nest);
    }
    keep
}

/// Convert a SocketAddr to kernel sockaddr bytes.
pub(crate) fn sockaddr_to_bytes(addr: &SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => {
            // struct sockaddr_in: family (2), port (2), addr (4), zero (8)
            let mut buf = vec![0u8; 16];
            buf[0..2].copy_from_slice(&(libc::AF_INET as u16).to_ne_bytes());
            buf[2..4].copy_from_slice(&v4.port().to_be_bytes());
            buf[4..8].copy_from_slice(&v4.ip().octets());
            buf
        }
        SocketAddr::V6(v6) => {
            // struct sockaddr_in6: family (2), port (2), flowinfo (4), addr (16), scope_id (4)
            let mut buf = vec![0u8; 28];
            buf[0..2].copy_from_slice(&(libc::AF_INET6 as u16).to_ne_bytes());
            buf[2..4].copy_from_slice(&v6.port().to_be_bytes());
            buf[4..8].copy_from_slice(&v6.flowinfo().to_be_bytes());
            buf[8..24].copy_from_slice(&v6.ip().octets());
            buf[24..28].copy_from_slice(&v6.scope_id().to_ne_bytes());
            buf
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::coalesce_peers;
    use crate::netlink::attr::{AttrIter, get};
    use crate::netlink::genl::GENL_HDRLEN;
    use crate::netlink::message::{NLMSG_HDRLEN, NlMsgHdr};
    use crate::netlink::wireguard::decode::parse_device;
    use std::net::Ipv4Addr;

    const FAMILY: u16 = 27;

    fn encode(device: &Device, capacity: usize) -> Vec<Vec<u8>> {
        SetEncoder::new(device, FAMILY, capacity)
            .map(|msg| msg.map(MessageBuilder::finish))
            .collect::<Result<_>>()
            .unwrap()
    }

    fn attrs(msg: &[u8]) -> &[u8] {
        &msg[NLMSG_HDRLEN + GENL_HDRLEN..]
    }

    fn top_level(msg: &[u8]) -> Vec<u16> {
        AttrIter::new(attrs(msg)).map(|(t, _)| t).collect()
    }

    /// Decode every message back, then coalesce like the get path does.
    fn decode(msgs: &[Vec<u8>]) -> Device {
        let mut dev = Device::default();
        for msg in msgs {
            parse_device(attrs(msg), &mut dev).unwrap();
        }
        dev.peers = coalesce_peers(std::mem::take(&mut dev.peers));
        dev
    }

    fn peer_attr_types(msg: &[u8]) -> Vec<Vec<u16>> {
        let mut out = Vec::new();
        for (t, payload) in AttrIter::new(attrs(msg)) {
            if t == WgDeviceAttr::Peers as u16 {
                for (_, peer) in AttrIter::new(payload) {
                    out.push(AttrIter::new(peer).map(|(t, _)| t).collect());
                }
            }
        }
        out
    }

    fn many_ips(count: u32) -> Vec<AllowedIp> {
        (0..count)
            .map(|i| AllowedIp::v4(Ipv4Addr::from(0x0a00_0000 + (i << 8)), 24))
            .collect()
    }

    #[test]
    fn test_single_message() {
        let dev = Device::new("wg0")
            .private_key([1u8; 32])
            .listen_port(51820)
            .fwmark(7)
            .replace_peers()
            .peer(
                Peer::new([2u8; 32])
                    .endpoint("10.0.0.1:51820".parse().unwrap())
                    .persistent_keepalive(25)
                    .preshared_key([3u8; 32])
                    .replace_allowed_ips()
                    .allowed_ips(many_ips(2)),
            );

        let msgs = encode(&dev, 8192);
        assert_eq!(msgs.len(), 1);

        let hdr = NlMsgHdr::from_bytes(&msgs[0]).unwrap();
        assert_eq!(hdr.nlmsg_type, FAMILY);
        assert_eq!(hdr.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
        assert_eq!(hdr.nlmsg_len as usize, msgs[0].len());
        assert_eq!(msgs[0][NLMSG_HDRLEN], WgCmd::SetDevice as u8);

        assert_eq!(
            top_level(&msgs[0]),
            vec![
                WgDeviceAttr::Ifname as u16,
                WgDeviceAttr::PrivateKey as u16,
                WgDeviceAttr::ListenPort as u16,
                WgDeviceAttr::Fwmark as u16,
                WgDeviceAttr::Flags as u16,
                WgDeviceAttr::Peers as u16,
            ]
        );

        let back = decode(&msgs);
        assert_eq!(back.name, "wg0");
        assert_eq!(back.listen_port, Some(51820));
        assert_eq!(back.peers.len(), 1);
        assert_eq!(back.peers[0].endpoint, dev.peers[0].endpoint);
        assert_eq!(back.peers[0].preshared_key, Some([3u8; 32]));
        assert_eq!(back.peers[0].allowed_ips, dev.peers[0].allowed_ips);
    }

    #[test]
    fn test_peer_flags() {
        let dev = Device::new("wg0").peer(Peer::new([2u8; 32]).remove().replace_allowed_ips());
        let msgs = encode(&dev, 8192);
        for (t, payload) in AttrIter::new(attrs(&msgs[0])) {
            if t == WgDeviceAttr::Peers as u16 {
                let (_, peer) = AttrIter::new(payload).next().unwrap();
                let flags = AttrIter::new(peer)
                    .find(|(t, _)| *t == WgPeerAttr::Flags as u16)
                    .map(|(_, p)| get::u32_ne(p).unwrap());
                assert_eq!(
                    flags,
                    Some(WgPeerFlag::RemoveMe as u32 | WgPeerFlag::ReplaceAllowedIps as u32)
                );
            }
        }
    }

    #[test]
    fn test_no_peers_has_no_peers_nest() {
        let dev = Device::new("wg0").listen_port(1);
        let msgs = encode(&dev, 8192);
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            top_level(&msgs[0]),
            vec![WgDeviceAttr::Ifname as u16, WgDeviceAttr::ListenPort as u16]
        );
    }

    #[test]
    fn test_split_preserves_allowed_ip_order() {
        let ips = many_ips(1000);
        let dev = Device::new("wg0")
            .private_key([1u8; 32])
            .listen_port(51820)
            .peer(
                Peer::new([2u8; 32])
                    .persistent_keepalive(25)
                    .replace_allowed_ips()
                    .allowed_ips(ips.clone()),
            )
            .peer(Peer::new([4u8; 32]).allowed_ips(many_ips(3)));

        let msgs = encode(&dev, 4096);
        assert!(msgs.len() > 1);
        for msg in &msgs {
            assert!(msg.len() <= 4096);
            assert_eq!(top_level(msg)[0], WgDeviceAttr::Ifname as u16);
        }

        // Device fields appear in exactly one message.
        let with_key = msgs
            .iter()
            .filter(|m| top_level(m).contains(&(WgDeviceAttr::PrivateKey as u16)))
            .count();
        assert_eq!(with_key, 1);

        // Peer fields appear once; resumed peer entries carry only the key and IPs.
        let keepalives = msgs
            .iter()
            .flat_map(|m| peer_attr_types(m))
            .filter(|types| types.contains(&(WgPeerAttr::PersistentKeepalive as u16)))
            .count();
        assert_eq!(keepalives, 1);
        for msg in &msgs[1..] {
            let first = &peer_attr_types(msg)[0];
            assert_eq!(first[0], WgPeerAttr::PublicKey as u16);
            assert!(!first.contains(&(WgPeerAttr::Flags as u16)));
        }

        let back = decode(&msgs);
        assert_eq!(back.peers.len(), 2);
        assert_eq!(back.peers[0].allowed_ips, ips);
        assert_eq!(back.peers[1].allowed_ips, many_ips(3));
    }

    #[test]
    fn test_split_many_peers() {
        let mut dev = Device::new("wg0");
        for i in 0..200u8 {
            dev = dev.peer(Peer::new([i; 32]).allowed_ips(many_ips(2)));
        }

        let msgs = encode(&dev, 1024);
        assert!(msgs.len() > 1);
        let back = decode(&msgs);
        assert_eq!(back.peers.len(), 200);
        for (i, peer) in back.peers.iter().enumerate() {
            assert_eq!(peer.public_key, [i as u8; 32]);
            assert_eq!(peer.allowed_ips, many_ips(2));
        }
    }

    #[test]
    fn test_every_capacity_round_trips() {
        let mut dev = Device::new("wg0").private_key([1u8; 32]).listen_port(51820);
        for i in 0..7u8 {
            let endpoint = if i % 2 == 0 {
                SocketAddr::from((Ipv4Addr::new(192, 0, 2, i), 51820 + i as u16))
            } else {
                SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, 51820 + i as u16))
            };
            dev = dev.peer(
                Peer::new([i + 10; 32])
                    .preshared_key([i + 100; 32])
                    .endpoint(endpoint)
                    .persistent_keepalive(25)
                    .allowed_ips(many_ips(3 + i as u32 * 5)),
            );
        }

        for capacity in 200..2000 {
            let msgs = encode(&dev, capacity);
            assert!(msgs.iter().all(|m| m.len() <= capacity), "capacity {}", capacity);

            let psks = msgs
                .iter()
                .flat_map(|m| peer_attr_types(m))
                .filter(|types| types.contains(&(WgPeerAttr::PresharedKey as u16)))
                .count();
            assert_eq!(psks, 7, "capacity {}", capacity);

            let back = decode(&msgs);
            assert_eq!(back.peers.len(), 7, "capacity {}", capacity);
            for (got, want) in back.peers.iter().zip(&dev.peers) {
                assert_eq!(got.public_key, want.public_key);
                assert_eq!(got.endpoint, want.endpoint);
                assert_eq!(got.allowed_ips, want.allowed_ips);
            }
        }
    }

    #[test]
    fn test_capacity_clamped_to_nest_length() {
        let ips = many_ips(5000);
        let dev = Device::new("wg0").peer(Peer::new([2u8; 32]).allowed_ips(ips.clone()));

        let msgs = encode(&dev, 1 << 20);
        assert!(msgs.len() > 1);
        assert!(msgs.iter().all(|m| m.len() <= MAX_MESSAGE_CAPACITY));

        let back = decode(&msgs);
        assert_eq!(back.peers.len(), 1);
        assert_eq!(back.peers[0].allowed_ips, ips);
    }

    #[test]
    fn test_no_progress_is_an_error() {
        let dev = Device::new("wg0").peer(Peer::new([2u8; 32]));
        // Room for the headers and the name only.
        let mut encoder = SetEncoder::new(&dev, FAMILY, NLMSG_HDRLEN + GENL_HDRLEN + 12);
        assert!(encoder.next().unwrap().is_ok());
        let err = encoder.next().unwrap().unwrap_err();
        assert_eq!(err.errno(), libc::EMSGSIZE);
        assert!(encoder.next().is_none());
    }
}
