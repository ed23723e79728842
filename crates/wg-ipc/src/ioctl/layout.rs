//! `wg(4)` ioctl buffer layout.
//!
//! A SIOCGWG/SIOCSWG buffer is one [`WgInterfaceIo`] followed by
//! `i_peers_count` peers, each a [`WgPeerIo`] immediately followed by its
//! `p_aips_count` [`WgAipIo`] entries:
//!
//! ```text
//! ┌──────────────┬────────────┬─────┬─────┬────────────┬─────┬ ─ ─
//! │ interface_io │ peer_io #0 │ aip │ aip │ peer_io #1 │ aip │
//! └──────────────┴────────────┴─────┴─────┴────────────┴─────┴ ─ ─
//! ```
//!
//! Structures follow `net/if_wg.h` on LP64 targets. Packing and unpacking
//! are pure byte-buffer operations so they can be exercised on any host.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use zerocopy::byteorder::network_endian;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::device::{AllowedIp, Device, Peer, Timespec};
use crate::error::{Error, Result};
use crate::key::{self, WG_KEY_LEN};

/// OpenBSD `AF_INET`.
pub const BSD_AF_INET: u8 = 2;
/// OpenBSD `AF_INET6`.
pub const BSD_AF_INET6: u8 = 24;

/// Interface flags (`i_flags`).
pub mod interface_flags {
    pub const HAS_PUBLIC: u8 = 1 << 0;
    pub const HAS_PRIVATE: u8 = 1 << 1;
    pub const HAS_PORT: u8 = 1 << 2;
    pub const HAS_RTABLE: u8 = 1 << 3;
    pub const REPLACE_PEERS: u8 = 1 << 4;
}

/// Peer flags (`p_flags`).
pub mod peer_flags {
    pub const HAS_PUBLIC: i32 = 1 << 0;
    pub const HAS_PSK: i32 = 1 << 1;
    pub const HAS_PKA: i32 = 1 << 2;
    pub const HAS_ENDPOINT: i32 = 1 << 3;
    pub const REPLACE_AIPS: i32 = 1 << 4;
    pub const REMOVE: i32 = 1 << 5;
}

/// `struct wg_interface_io` without its flexible peer array.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct WgInterfaceIo {
    pub i_flags: u8,
    _pad0: u8,
    pub i_port: u16,
    pub i_rtable: i32,
    pub i_public: [u8; WG_KEY_LEN],
    pub i_private: [u8; WG_KEY_LEN],
    pub i_peers_count: u64,
}

/// `struct wg_peer_io` without its flexible allowed-IP array.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct WgPeerIo {
    pub p_flags: i32,
    pub p_protocol_version: i32,
    pub p_public: [u8; WG_KEY_LEN],
    pub p_psk: [u8; WG_KEY_LEN],
    pub p_pka: u16,
    _pad0: [u8; 2],
    /// `union { sockaddr, sockaddr_in, sockaddr_in6 }`.
    pub p_endpoint: [u8; SOCKADDR_IN6_LEN],
    pub p_txbytes: u64,
    pub p_rxbytes: u64,
    pub p_last_handshake_sec: i64,
    pub p_last_handshake_nsec: i64,
    pub p_aips_count: u64,
}

/// `struct wg_aip_io`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct WgAipIo {
    pub a_af: u8,
    _pad0: [u8; 3],
    pub a_cidr: i32,
    /// `union { in_addr, in6_addr }`.
    pub a_addr: [u8; 16],
}

/// BSD `struct sockaddr_in` (leading length byte).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct BsdSockaddrIn {
    sin_len: u8,
    sin_family: u8,
    sin_port: network_endian::U16,
    sin_addr: [u8; 4],
    sin_zero: [u8; 8],
}

/// BSD `struct sockaddr_in6`.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct BsdSockaddrIn6 {
    sin6_len: u8,
    sin6_family: u8,
    sin6_port: network_endian::U16,
    sin6_flowinfo: network_endian::U32,
    sin6_addr: [u8; 16],
    sin6_scope_id: u32,
}

/// Size of the interface header.
pub const INTERFACE_IO_LEN: usize = std::mem::size_of::<WgInterfaceIo>();
/// Size of a peer header.
pub const PEER_IO_LEN: usize = std::mem::size_of::<WgPeerIo>();
/// Size of an allowed-IP entry.
pub const AIP_IO_LEN: usize = std::mem::size_of::<WgAipIo>();

const SOCKADDR_IN_LEN: usize = 16;
const SOCKADDR_IN6_LEN: usize = 28;

/// Total buffer size needed to describe `device`.
pub fn packed_size(device: &Device) -> usize {
    INTERFACE_IO_LEN
        + device
            .peers
            .iter()
            .map(|peer| PEER_IO_LEN + peer.allowed_ips.len() * AIP_IO_LEN)
            .sum::<usize>()
}

/// Serialize `device` into a SIOCSWG buffer.
pub fn pack_device(device: &Device) -> Vec<u8> {
    let mut buf = Vec::with_capacity(packed_size(device));

    let mut iface = WgInterfaceIo {
        i_peers_count: device.peers.len() as u64,
        ..Default::default()
    };
    if let Some(private) = device.get_private_key() {
        iface.i_private = *private;
        iface.i_flags |= interface_flags::HAS_PRIVATE;
    }
    if let Some(port) = device.listen_port {
        iface.i_port = port;
        iface.i_flags |= interface_flags::HAS_PORT;
    }
    if let Some(mark) = device.fwmark {
        iface.i_rtable = mark as i32;
        iface.i_flags |= interface_flags::HAS_RTABLE;
    }
    if device.replace_peers {
        iface.i_flags |= interface_flags::REPLACE_PEERS;
    }
    buf.extend_from_slice(iface.as_bytes());

    for peer in &device.peers {
        buf.extend_from_slice(pack_peer(peer).as_bytes());
        for allowed_ip in &peer.allowed_ips {
            buf.extend_from_slice(pack_allowed_ip(allowed_ip).as_bytes());
        }
    }
    buf
}

fn pack_peer(peer: &Peer) -> WgPeerIo {
    let mut io = WgPeerIo {
        p_flags: peer_flags::HAS_PUBLIC,
        p_public: peer.public_key,
        p_aips_count: peer.allowed_ips.len() as u64,
        ..Default::default()
    };
    if let Some(psk) = &peer.preshared_key {
        io.p_psk = *psk;
        io.p_flags |= peer_flags::HAS_PSK;
    }
    if let Some(interval) = peer.persistent_keepalive {
        io.p_pka = interval;
        io.p_flags |= peer_flags::HAS_PKA;
    }
    if let Some(endpoint) = &peer.endpoint {
        io.p_endpoint = sockaddr_to_bsd(endpoint);
        io.p_flags |= peer_flags::HAS_ENDPOINT;
    }
    if peer.replace_allowed_ips {
        io.p_flags |= peer_flags::REPLACE_AIPS;
    }
    if peer.remove {
        io.p_flags |= peer_flags::REMOVE;
    }
    io
}

fn pack_allowed_ip(allowed_ip: &AllowedIp) -> WgAipIo {
    let mut io = WgAipIo {
        a_cidr: i32::from(allowed_ip.cidr),
        ..Default::default()
    };
    match allowed_ip.addr {
        IpAddr::V4(v4) => {
            io.a_af = BSD_AF_INET;
            io.a_addr[..4].copy_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            io.a_af = BSD_AF_INET6;
            io.a_addr = v6.octets();
        }
    }
    io
}

/// Deserialize a SIOCGWG buffer into a device called `name`.
pub fn unpack_device(name: &str, buf: &[u8]) -> Result<Device> {
    let mut reader = Reader { buf };
    let iface: WgInterfaceIo = reader.read()?;

    let mut device = Device::new(name);
    if iface.i_flags & interface_flags::HAS_RTABLE != 0 {
        device.fwmark = Some(iface.i_rtable as u32);
    }
    if iface.i_flags & interface_flags::HAS_PORT != 0 {
        device.listen_port = Some(iface.i_port);
    }
    if iface.i_flags & interface_flags::HAS_PRIVATE != 0 {
        device.set_private_key(Some(iface.i_private));
    }

    for _ in 0..iface.i_peers_count {
        let io: WgPeerIo = reader.read()?;
        let mut peer = unpack_peer(&io)?;
        for _ in 0..io.p_aips_count {
            let aip: WgAipIo = reader.read()?;
            peer.allowed_ips.push(unpack_allowed_ip(&aip)?);
        }
        device.peers.push(peer);
    }
    Ok(device)
}

fn unpack_peer(io: &WgPeerIo) -> Result<Peer> {
    if io.p_flags & peer_flags::HAS_PUBLIC == 0 {
        return Err(Error::protocol("peer without public key"));
    }

    let mut peer = Peer::new(io.p_public);
    if io.p_flags & peer_flags::HAS_PSK != 0 && !key::is_zero(&io.p_psk) {
        peer.preshared_key = Some(io.p_psk);
    }
    if io.p_flags & peer_flags::HAS_PKA != 0 {
        peer.persistent_keepalive = Some(io.p_pka);
    }
    if io.p_flags & peer_flags::HAS_ENDPOINT != 0 {
        peer.endpoint = sockaddr_from_bsd(&io.p_endpoint);
    }
    if io.p_protocol_version > 0 {
        peer.protocol_version = Some(io.p_protocol_version as u32);
    }
    peer.rx_bytes = io.p_rxbytes;
    peer.tx_bytes = io.p_txbytes;
    peer.last_handshake = Timespec {
        sec: io.p_last_handshake_sec,
        nsec: io.p_last_handshake_nsec,
    };
    Ok(peer)
}

fn unpack_allowed_ip(io: &WgAipIo) -> Result<AllowedIp> {
    let addr = match io.a_af {
        BSD_AF_INET => IpAddr::V4(Ipv4Addr::new(
            io.a_addr[0],
            io.a_addr[1],
            io.a_addr[2],
            io.a_addr[3],
        )),
        BSD_AF_INET6 => IpAddr::V6(Ipv6Addr::from(io.a_addr)),
        af => return Err(Error::protocol(format!("allowed IP with family {}", af))),
    };
    u8::try_from(io.a_cidr)
        .ok()
        .and_then(|cidr| AllowedIp::new(addr, cidr))
        .ok_or_else(|| Error::protocol(format!("allowed IP {} with prefix {}", addr, io.a_cidr)))
}

/// Encode an endpoint as a BSD sockaddr union.
fn sockaddr_to_bsd(addr: &SocketAddr) -> [u8; SOCKADDR_IN6_LEN] {
    let mut out = [0u8; SOCKADDR_IN6_LEN];
    match addr {
        SocketAddr::V4(v4) => {
            let sin = BsdSockaddrIn {
                sin_len: SOCKADDR_IN_LEN as u8,
                sin_family: BSD_AF_INET,
                sin_port: network_endian::U16::new(v4.port()),
                sin_addr: v4.ip().octets(),
                sin_zero: [0; 8],
            };
            out[..SOCKADDR_IN_LEN].copy_from_slice(sin.as_bytes());
        }
        SocketAddr::V6(v6) => {
            let sin6 = BsdSockaddrIn6 {
                sin6_len: SOCKADDR_IN6_LEN as u8,
                sin6_family: BSD_AF_INET6,
                sin6_port: network_endian::U16::new(v6.port()),
                sin6_flowinfo: network_endian::U32::new(v6.flowinfo()),
                sin6_addr: v6.ip().octets(),
                sin6_scope_id: v6.scope_id(),
            };
            out.copy_from_slice(sin6.as_bytes());
        }
    }
    out
}

/// Decode a BSD sockaddr union; unknown families yield `None`.
fn sockaddr_from_bsd(data: &[u8; SOCKADDR_IN6_LEN]) -> Option<SocketAddr> {
    match data[1] {
        BSD_AF_INET => {
            let (sin, _) = BsdSockaddrIn::read_from_prefix(data).ok()?;
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(sin.sin_addr),
                sin.sin_port.get(),
            )))
        }
        BSD_AF_INET6 => {
            let sin6 = BsdSockaddrIn6::read_from_bytes(data).ok()?;
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr),
                sin6.sin6_port.get(),
                sin6.sin6_flowinfo.get(),
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

/// Sequential reader over a kernel-filled buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl Reader<'_> {
    fn read<T: FromBytes>(&mut self) -> Result<T> {
        let expected = std::mem::size_of::<T>();
        let (value, rest) = T::read_from_prefix(self.buf).map_err(|_| Error::Truncated {
            expected,
            actual: self.buf.len(),
        })?;
        self.buf = rest;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(INTERFACE_IO_LEN, 80);
        assert_eq!(PEER_IO_LEN, 144);
        assert_eq!(AIP_IO_LEN, 24);
        assert_eq!(std::mem::size_of::<BsdSockaddrIn>(), SOCKADDR_IN_LEN);
        assert_eq!(std::mem::size_of::<BsdSockaddrIn6>(), SOCKADDR_IN6_LEN);
    }

    fn sample() -> Device {
        Device::new("wg0")
            .private_key([1u8; 32])
            .listen_port(51820)
            .fwmark(3)
            .replace_peers()
            .peer(
                Peer::new([2u8; 32])
                    .preshared_key([3u8; 32])
                    .endpoint("192.0.2.1:51820".parse().unwrap())
                    .persistent_keepalive(25)
                    .allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 0), 8))
                    .allowed_ip(AllowedIp::v6("fd00::".parse().unwrap(), 48)),
            )
            .peer(
                Peer::new([4u8; 32])
                    .endpoint(SocketAddr::V6(SocketAddrV6::new(
                        "fe80::1".parse().unwrap(),
                        1234,
                        7,
                        2,
                    )))
                    .replace_allowed_ips(),
            )
    }

    #[test]
    fn test_pack_layout() {
        let device = sample();
        let buf = pack_device(&device);
        assert_eq!(buf.len(), packed_size(&device));
        assert_eq!(buf.len(), 80 + 144 + 2 * 24 + 144);

        let (iface, _) = WgInterfaceIo::read_from_prefix(&buf).unwrap();
        assert_eq!(
            iface.i_flags,
            interface_flags::HAS_PRIVATE
                | interface_flags::HAS_PORT
                | interface_flags::HAS_RTABLE
                | interface_flags::REPLACE_PEERS
        );
        assert_eq!(iface.i_peers_count, 2);

        let (peer, _) = WgPeerIo::read_from_prefix(&buf[80..]).unwrap();
        assert_eq!(
            peer.p_flags,
            peer_flags::HAS_PUBLIC | peer_flags::HAS_PSK | peer_flags::HAS_PKA | peer_flags::HAS_ENDPOINT
        );
        assert_eq!(peer.p_aips_count, 2);
        assert_eq!(&peer.p_endpoint[..8], &[16, 2, 0xca, 0x6c, 192, 0, 2, 1]);

        let (aip, _) = WgAipIo::read_from_prefix(&buf[80 + 144..]).unwrap();
        assert_eq!(aip.a_af, BSD_AF_INET);
        assert_eq!(aip.a_cidr, 8);
        assert_eq!(&aip.a_addr[..4], &[10, 0, 0, 0]);

        let (second, _) = WgPeerIo::read_from_prefix(&buf[80 + 144 + 48..]).unwrap();
        assert_eq!(second.p_public, [4u8; 32]);
        assert_eq!(second.p_flags & peer_flags::REPLACE_AIPS, peer_flags::REPLACE_AIPS);
        assert_eq!(second.p_endpoint[0], 28);
        assert_eq!(second.p_endpoint[1], BSD_AF_INET6);
    }

    #[test]
    fn test_unpack_packed_buffer() {
        let mut device = sample();
        let buf = pack_device(&device);
        let parsed = unpack_device("wg0", &buf).unwrap();

        // Set-only directives are not reported back.
        device.replace_peers = false;
        device.peers[1].replace_allowed_ips = false;
        assert_eq!(parsed, device);
    }

    #[test]
    fn test_unpack_state_fields() {
        let mut buf = WgInterfaceIo {
            i_flags: interface_flags::HAS_PUBLIC,
            i_public: [9u8; 32],
            i_peers_count: 1,
            ..Default::default()
        }
        .as_bytes()
        .to_vec();
        buf.extend_from_slice(
            WgPeerIo {
                p_flags: peer_flags::HAS_PUBLIC | peer_flags::HAS_PSK,
                p_protocol_version: 1,
                p_public: [5u8; 32],
                p_txbytes: 10,
                p_rxbytes: 20,
                p_last_handshake_sec: 1_700_000_000,
                p_last_handshake_nsec: 42,
                ..Default::default()
            }
            .as_bytes(),
        );

        let device = unpack_device("wg0", &buf).unwrap();
        assert_eq!(device.get_private_key(), None);
        assert_eq!(device.get_public_key(), None);

        let peer = &device.peers[0];
        assert_eq!(peer.preshared_key, None);
        assert_eq!(peer.endpoint, None);
        assert_eq!(peer.protocol_version, Some(1));
        assert_eq!(peer.tx_bytes, 10);
        assert_eq!(peer.rx_bytes, 20);
        assert_eq!(peer.last_handshake.sec, 1_700_000_000);
        assert_eq!(peer.last_handshake.nsec, 42);
    }

    #[test]
    fn test_unpack_truncated() {
        let buf = pack_device(&sample());
        let err = unpack_device("wg0", &buf[..buf.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
        assert!(err.is_protocol());

        assert!(unpack_device("wg0", &[0u8; 10]).is_err());
    }

    #[test]
    fn test_unpack_bad_allowed_ip() {
        let mut device = Device::new("wg0").peer(
            Peer::new([1u8; 32]).allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 0), 8)),
        );
        let mut buf = pack_device(&device);
        let aip_offset = INTERFACE_IO_LEN + PEER_IO_LEN;

        buf[aip_offset] = 99;
        assert!(unpack_device("wg0", &buf).unwrap_err().is_protocol());

        device.peers[0].allowed_ips[0].cidr = 33;
        let buf = pack_device(&device);
        assert!(unpack_device("wg0", &buf).unwrap_err().is_protocol());
    }

    #[test]
    fn test_sockaddr_round_trip() {
        let v6: SocketAddr = SocketAddr::V6(SocketAddrV6::new("2001:db8::1".parse().unwrap(), 443, 0x12345, 3));
        assert_eq!(sockaddr_from_bsd(&sockaddr_to_bsd(&v6)), Some(v6));

        let v4: SocketAddr = "203.0.113.9:1".parse().unwrap();
        assert_eq!(sockaddr_from_bsd(&sockaddr_to_bsd(&v4)), Some(v4));

        assert_eq!(sockaddr_from_bsd(&[0u8; SOCKADDR_IN6_LEN]), None);
    }
}
