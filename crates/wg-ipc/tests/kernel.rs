//! Kernel transport tests against the Linux WireGuard module.
//!
//! These need root and the `wireguard` module. Run them inside a throwaway
//! network namespace:
//! `sudo unshare -n cargo test -p wg-ipc --test kernel --features integration`

#![cfg(all(feature = "integration", target_os = "linux"))]

use std::net::Ipv4Addr;
use std::process::Command;

use wg_ipc::key::public_from_private;
use wg_ipc::{AllowedIp, ConfigTransport, Device, NameList, NetlinkTransport, Peer};

/// Skip the test unless running as root.
macro_rules! require_root {
    () => {
        if unsafe { libc::geteuid() } != 0 {
            eprintln!("skipping: requires root");
            return;
        }
    };
}

/// A WireGuard link deleted on drop.
struct TestLink {
    name: &'static str,
}

impl TestLink {
    fn new(name: &'static str) -> Self {
        let status = Command::new("ip")
            .args(["link", "add", name, "type", "wireguard"])
            .status()
            .expect("failed to run ip");
        assert!(status.success(), "ip link add {} failed", name);
        Self { name }
    }
}

impl Drop for TestLink {
    fn drop(&mut self) {
        let _ = Command::new("ip").args(["link", "del", self.name]).status();
    }
}

#[test]
fn test_link_is_listed() {
    require_root!();
    let link = TestLink::new("wgtest0");

    let mut names = NameList::new();
    NetlinkTransport::new().list_interfaces(&mut names).unwrap();
    assert!(names.contains(link.name));
}

#[test]
fn test_set_and_get_split_device() {
    require_root!();
    let link = TestLink::new("wgtest1");
    let transport = NetlinkTransport::with_message_capacity(1024);

    let private = [0x41u8; 32];
    let allowed_ips: Vec<AllowedIp> = (0..300u32)
        .map(|i| AllowedIp::v4(Ipv4Addr::from(0x0a00_0000 + (i << 8)), 24))
        .collect();
    let device = Device::new(link.name)
        .private_key(private)
        .listen_port(51999)
        .fwmark(7)
        .peer(
            Peer::new([0x42u8; 32])
                .endpoint("192.0.2.1:51820".parse().unwrap())
                .persistent_keepalive(25)
                .allowed_ips(allowed_ips.clone()),
        )
        .peer(Peer::new([0x43u8; 32]));

    transport.set_device(&device).unwrap();
    let read = transport.get_device(link.name).unwrap();

    assert_eq!(read.get_public_key(), Some(&public_from_private(&private)));
    assert_eq!(read.listen_port, Some(51999));
    assert_eq!(read.fwmark, Some(7));
    assert!(read.ifindex.is_some());
    assert_eq!(read.peers.len(), 2);

    let peer = read.find_peer(&[0x42u8; 32]).unwrap();
    assert_eq!(peer.endpoint, Some("192.0.2.1:51820".parse().unwrap()));
    assert_eq!(peer.persistent_keepalive, Some(25));
    // The kernel reports allowed IPs grouped by family in trie order; all
    // entries must survive the split.
    let mut got: Vec<String> = peer.allowed_ips.iter().map(|ip| ip.to_string()).collect();
    let mut want: Vec<String> = allowed_ips.iter().map(|ip| ip.to_string()).collect();
    got.sort();
    want.sort();
    assert_eq!(got, want);
}

#[test]
fn test_missing_device() {
    require_root!();
    let err = NetlinkTransport::new().get_device("wgmissing0").unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
}
