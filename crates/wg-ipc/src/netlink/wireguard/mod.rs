//! WireGuard configuration via Generic Netlink.
//!
//! Interface enumeration goes through RTNetlink (see [`super::link`]), but
//! all configuration (keys, peers, allowed IPs) is done via the `wireguard`
//! GENL family.

mod decode;
mod encode;

pub use encode::{MAX_MESSAGE_CAPACITY, SetEncoder, default_message_capacity};

use crate::backend::ConfigTransport;
use crate::device::{Device, coalesce_peers, validate_ifname};
use crate::error::Result;
use crate::names::NameList;
use crate::netlink::genl::{genl_attrs, genl_request, resolve_family};
use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST};
use crate::netlink::socket::{DumpEnd, NetlinkSocket, Protocol, retry_interrupted};

/// WireGuard Generic Netlink family name.
pub const WG_GENL_NAME: &str = "wireguard";

/// WireGuard Generic Netlink version.
pub const WG_GENL_VERSION: u8 = 1;

/// WireGuard GENL commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgCmd {
    GetDevice = 0,
    SetDevice = 1,
}

/// WireGuard device attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgDeviceAttr {
    Unspec = 0,
    Ifindex = 1,
    Ifname = 2,
    PrivateKey = 3,
    PublicKey = 4,
    Flags = 5,
    ListenPort = 6,
    Fwmark = 7,
    Peers = 8,
}

/// WireGuard peer attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgPeerAttr {
    Unspec = 0,
    PublicKey = 1,
    PresharedKey = 2,
    Flags = 3,
    Endpoint = 4,
    PersistentKeepalive = 5,
    LastHandshake = 6,
    RxBytes = 7,
    TxBytes = 8,
    AllowedIps = 9,
    ProtocolVersion = 10,
}

/// WireGuard allowed IP attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgAllowedIpAttr {
    Unspec = 0,
    Family = 1,
    IpAddr = 2,
    CidrMask = 3,
}

/// WireGuard device flags.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgDeviceFlag {
    /// Replace all peers instead of adding
    ReplacePeers = 1 << 0,
}

/// Peer flags for SET_DEVICE operations.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgPeerFlag {
    /// Remove this peer.
    RemoveMe = 1 << 0,
    /// Replace all allowed IPs (instead of adding).
    ReplaceAllowedIps = 1 << 1,
}

/// Kernel transport for Linux: generic netlink for configuration, route
/// netlink for enumeration.
///
/// Every operation opens its own socket and closes it before returning.
#[derive(Debug, Clone)]
pub struct NetlinkTransport {
    message_capacity: usize,
}

impl Default for NetlinkTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlinkTransport {
    /// Create a transport using the default message capacity.
    pub fn new() -> Self {
        Self::with_message_capacity(default_message_capacity())
    }

    /// Create a transport that splits SET_DEVICE requests at `capacity` bytes,
    /// clamped to [`MAX_MESSAGE_CAPACITY`].
    pub fn with_message_capacity(capacity: usize) -> Self {
        Self {
            message_capacity: capacity.min(MAX_MESSAGE_CAPACITY),
        }
    }

    fn open() -> Result<(NetlinkSocket, u16)> {
        let socket = NetlinkSocket::new(Protocol::Generic)?;
        let family_id = resolve_family(&socket, WG_GENL_NAME)?;
        Ok((socket, family_id))
    }

    fn fetch_device(name: &str) -> Result<Device> {
        let (socket, family_id) = Self::open()?;

        let mut request = genl_request(
            family_id,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP,
            WgCmd::GetDevice as u8,
            WG_GENL_VERSION,
        );
        request.append_attr_str(WgDeviceAttr::Ifname as u16, name);

        let mut device = Device::new(name);
        let end = socket.dump(request, |_, payload| {
            decode::parse_device(genl_attrs(payload)?, &mut device)
        })?;
        if end == DumpEnd::Interrupted {
            tracing::debug!(ifname = name, peers = device.peers.len(), "partial device dump");
        }

        device.peers = coalesce_peers(std::mem::take(&mut device.peers));
        Ok(device)
    }
}

impl ConfigTransport for NetlinkTransport {
    fn list_interfaces(&self, names: &mut NameList) -> Result<()> {
        super::link::list_wireguard_links(names)
    }

    fn get_device(&self, name: &str) -> Result<Device> {
        validate_ifname(name)?;
        retry_interrupted(|| Self::fetch_device(name))
    }

    fn set_device(&self, device: &Device) -> Result<()> {
        validate_ifname(&device.name)?;
        let (socket, family_id) = Self::open()?;

        for (index, msg) in SetEncoder::new(device, family_id, self.message_capacity).enumerate() {
            let msg = msg?;
            tracing::debug!(
                ifname = %device.name,
                index,
                len = msg.len(),
                "sending SET_DEVICE message"
            );
            socket.request_ack(msg)?;
        }
        Ok(())
    }
}
