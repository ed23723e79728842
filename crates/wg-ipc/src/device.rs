//! WireGuard configuration model.
//!
//! A [`Device`] is what every transport produces on get and consumes on set.
//! Counters, handshake time and protocol version are only ever filled in by a
//! get; the set paths ignore them.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::key::{self, Key};

/// Maximum interface name length, including the terminating NUL.
pub const IFNAMSIZ: usize = 16;

/// Validate a kernel interface name.
pub fn validate_ifname(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }

    if name.len() >= IFNAMSIZ {
        return Err(Error::InvalidName(format!(
            "{}: name too long (max {} chars)",
            name,
            IFNAMSIZ - 1
        )));
    }

    if name.contains('/') || name.contains('\0') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(format!(
            "{:?}: name contains invalid characters",
            name
        )));
    }

    Ok(())
}

/// A WireGuard interface and its peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Interface name.
    pub name: String,
    /// Interface index (reported by the kernel netlink transport only).
    pub ifindex: Option<u32>,
    private_key: Option<Key>,
    public_key: Option<Key>,
    /// UDP listen port.
    pub listen_port: Option<u16>,
    /// Firewall mark for outgoing packets.
    pub fwmark: Option<u32>,
    /// Replace all existing peers instead of merging.
    pub replace_peers: bool,
    /// Peers, in the order they were configured.
    pub peers: Vec<Peer>,
}

impl Device {
    /// Create an empty device with the given interface name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the private key. The public key is derived from it.
    pub fn private_key(mut self, key: Key) -> Self {
        self.set_private_key(Some(key));
        self
    }

    /// Set the listen port.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Set the firewall mark.
    pub fn fwmark(mut self, mark: u32) -> Self {
        self.fwmark = Some(mark);
        self
    }

    /// Replace all existing peers (instead of merging).
    pub fn replace_peers(mut self) -> Self {
        self.replace_peers = true;
        self
    }

    /// Add a peer to configure.
    pub fn peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Replace the private key, recomputing the public key.
    pub fn set_private_key(&mut self, key: Option<Key>) {
        self.public_key = key.as_ref().map(key::public_from_private);
        self.private_key = key;
    }

    /// Get the private key if set.
    pub fn get_private_key(&self) -> Option<&Key> {
        self.private_key.as_ref()
    }

    /// Get the public key derived from the private key.
    pub fn get_public_key(&self) -> Option<&Key> {
        self.public_key.as_ref()
    }

    /// Find a peer by public key.
    pub fn find_peer(&self, public_key: &Key) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}

/// A WireGuard peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    /// Peer's public key (identifies the peer).
    pub public_key: Key,
    /// Optional preshared key. All-zero keys are never stored here.
    pub preshared_key: Option<Key>,
    /// Peer's endpoint.
    pub endpoint: Option<SocketAddr>,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Time of the last completed handshake.
    pub last_handshake: Timespec,
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes sent to this peer.
    pub tx_bytes: u64,
    /// Protocol version.
    pub protocol_version: Option<u32>,
    /// Replace all allowed IPs instead of adding.
    pub replace_allowed_ips: bool,
    /// Remove this peer.
    pub remove: bool,
    /// Allowed IP ranges, in the order they were configured.
    pub allowed_ips: Vec<AllowedIp>,
}

impl Peer {
    /// Create a new peer with the given public key.
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            ..Default::default()
        }
    }

    /// Set the preshared key. An all-zero key clears it.
    pub fn preshared_key(mut self, key: Key) -> Self {
        self.preshared_key = (!key::is_zero(&key)).then_some(key);
        self
    }

    /// Set the endpoint address.
    pub fn endpoint(mut self, addr: SocketAddr) -> Self {
        self.endpoint = Some(addr);
        self
    }

    /// Set the persistent keepalive interval in seconds.
    pub fn persistent_keepalive(mut self, interval: u16) -> Self {
        self.persistent_keepalive = Some(interval);
        self
    }

    /// Add an allowed IP range.
    pub fn allowed_ip(mut self, ip: AllowedIp) -> Self {
        self.allowed_ips.push(ip);
        self
    }

    /// Add multiple allowed IP ranges.
    pub fn allowed_ips(mut self, ips: impl IntoIterator<Item = AllowedIp>) -> Self {
        self.allowed_ips.extend(ips);
        self
    }

    /// Replace all existing allowed IPs instead of adding.
    pub fn replace_allowed_ips(mut self) -> Self {
        self.replace_allowed_ips = true;
        self
    }

    /// Mark this peer for removal.
    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }

    /// Last handshake as wall-clock time, `None` if there never was one.
    pub fn last_handshake(&self) -> Option<SystemTime> {
        self.last_handshake.to_system_time()
    }
}

/// Seconds and nanoseconds since the Unix epoch, as the kernel reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    /// Seconds.
    pub sec: i64,
    /// Nanoseconds.
    pub nsec: i64,
}

impl Timespec {
    /// Check if this is the zero time ("never").
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Convert to a `SystemTime`.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        if self.is_zero() || self.sec < 0 || !(0..1_000_000_000).contains(&self.nsec) {
            return None;
        }
        Some(UNIX_EPOCH + Duration::new(self.sec as u64, self.nsec as u32))
    }

    /// Parse the kernel's 16-byte `struct __kernel_timespec` (two native i64).
    pub fn from_ne_bytes(data: &[u8]) -> Option<Self> {
        let data: &[u8; 16] = data.try_into().ok()?;
        let (sec, nsec) = data.split_at(8);
        Some(Self {
            sec: i64::from_ne_bytes(sec.try_into().ok()?),
            nsec: i64::from_ne_bytes(nsec.try_into().ok()?),
        })
    }
}

/// An allowed IP range for a WireGuard peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedIp {
    /// IP address (network portion).
    pub addr: IpAddr,
    /// CIDR prefix length.
    pub cidr: u8,
}

impl AllowedIp {
    /// Create an allowed IP range, rejecting prefixes longer than the address.
    pub fn new(addr: IpAddr, cidr: u8) -> Option<Self> {
        let ip = Self { addr, cidr };
        (cidr <= ip.max_cidr()).then_some(ip)
    }

    /// Create an IPv4 allowed IP range.
    pub fn v4(addr: Ipv4Addr, cidr: u8) -> Self {
        Self {
            addr: IpAddr::V4(addr),
            cidr: cidr.min(32),
        }
    }

    /// Create an IPv6 allowed IP range.
    pub fn v6(addr: Ipv6Addr, cidr: u8) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            cidr: cidr.min(128),
        }
    }

    /// Longest valid prefix for this address family.
    pub fn max_cidr(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Get the address family (AF_INET or AF_INET6).
    pub fn family(&self) -> u16 {
        match self.addr {
            IpAddr::V4(_) => libc::AF_INET as u16,
            IpAddr::V6(_) => libc::AF_INET6 as u16,
        }
    }

    /// Get the address bytes.
    pub fn addr_bytes(&self) -> Vec<u8> {
        match self.addr {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }
}

impl std::fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.cidr)
    }
}

/// Merge adjacent peers that share a public key.
///
/// Large peers arrive split across several replies, each repeating the public
/// key; their allowed IPs are concatenated in order. Non-adjacent duplicates
/// are left alone.
pub(crate) fn coalesce_peers(peers: Vec<Peer>) -> Vec<Peer> {
    let mut merged: Vec<Peer> = Vec::with_capacity(peers.len());
    for peer in peers {
        match merged.last_mut() {
            Some(last) if last.public_key == peer.public_key => {
                last.allowed_ips.extend(peer.allowed_ips);
            }
            _ => merged.push(peer),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ifname() {
        assert!(validate_ifname("wg0").is_ok());
        assert!(validate_ifname("wg-office-vpn15").is_ok());
        assert!(validate_ifname("").is_err());
        assert!(validate_ifname("wg-office-vpn-16").is_err());
        assert!(validate_ifname("wg/0").is_err());
        assert!(validate_ifname("wg 0").is_err());
        assert_eq!(validate_ifname("a/b").unwrap_err().errno(), libc::EINVAL);
    }

    #[test]
    fn test_public_key_follows_private_key() {
        let dev = Device::new("wg0").private_key([3u8; 32]);
        assert_eq!(
            dev.get_public_key(),
            Some(&key::public_from_private(&[3u8; 32]))
        );

        let mut dev = dev;
        dev.set_private_key(None);
        assert!(dev.get_private_key().is_none());
        assert!(dev.get_public_key().is_none());
    }

    #[test]
    fn test_device_builder() {
        let dev = Device::new("wg0")
            .listen_port(51820)
            .fwmark(100)
            .replace_peers()
            .peer(Peer::new([1u8; 32]));

        assert_eq!(dev.name, "wg0");
        assert_eq!(dev.listen_port, Some(51820));
        assert_eq!(dev.fwmark, Some(100));
        assert!(dev.replace_peers);
        assert_eq!(dev.peers.len(), 1);
        assert!(dev.find_peer(&[1u8; 32]).is_some());
        assert!(dev.find_peer(&[2u8; 32]).is_none());
    }

    #[test]
    fn test_peer_builder() {
        let peer = Peer::new([2u8; 32])
            .persistent_keepalive(25)
            .allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 0), 24))
            .replace_allowed_ips()
            .preshared_key([0u8; 32]);

        assert_eq!(peer.persistent_keepalive, Some(25));
        assert_eq!(peer.allowed_ips.len(), 1);
        assert!(peer.replace_allowed_ips);
        assert!(!peer.remove);
        assert!(peer.preshared_key.is_none());
        assert!(Peer::new([2u8; 32]).remove().remove);
    }

    #[test]
    fn test_allowed_ip_v4() {
        let ip = AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 0), 8);
        assert_eq!(ip.family(), libc::AF_INET as u16);
        assert_eq!(ip.addr_bytes(), vec![10, 0, 0, 0]);
        assert_eq!(ip.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn test_allowed_ip_v6() {
        let ip = AllowedIp::v6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0), 64);
        assert_eq!(ip.family(), libc::AF_INET6 as u16);
        assert_eq!(ip.to_string(), "fd00::/64");
    }

    #[test]
    fn test_allowed_ip_cidr_bounds() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert!(AllowedIp::new(v4, 32).is_some());
        assert!(AllowedIp::new(v4, 33).is_none());
        assert!(AllowedIp::new(v6, 128).is_some());
        assert!(AllowedIp::new(v6, 129).is_none());
    }

    #[test]
    fn test_timespec() {
        assert!(Timespec::default().to_system_time().is_none());

        let mut data = [0u8; 16];
        data[0..8].copy_from_slice(&1609459200i64.to_ne_bytes());
        let ts = Timespec::from_ne_bytes(&data).unwrap();
        assert_eq!(
            ts.to_system_time().unwrap(),
            UNIX_EPOCH + Duration::from_secs(1609459200)
        );
        assert!(Timespec::from_ne_bytes(&data[..15]).is_none());
    }

    #[test]
    fn test_coalesce_adjacent_peers() {
        let a = Peer::new([1u8; 32]).allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 1), 32));
        let a2 = Peer::new([1u8; 32]).allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 2), 32));
        let b = Peer::new([2u8; 32]);
        let a3 = Peer::new([1u8; 32]);

        let merged = coalesce_peers(vec![a, a2, b, a3]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].allowed_ips.len(), 2);
        assert_eq!(merged[0].allowed_ips[1].to_string(), "10.0.0.2/32");
        assert_eq!(merged[1].public_key, [2u8; 32]);
        assert_eq!(merged[2].public_key, [1u8; 32]);
    }
}
