//! WireGuard interface enumeration over RTNetlink.
//!
//! Dumps every link and keeps those whose `IFLA_LINKINFO` kind is
//! `wireguard`.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgType};
use super::socket::{DumpEnd, NetlinkSocket, Protocol, retry_interrupted};
use crate::error::Result;
use crate::names::NameList;

/// Link kind reported by the WireGuard module.
pub const WG_LINK_KIND: &str = "wireguard";

/// `IFLA_IFNAME`.
const IFLA_IFNAME: u16 = 3;
/// `IFLA_LINKINFO`.
const IFLA_LINKINFO: u16 = 18;
/// `IFLA_INFO_KIND`.
const IFLA_INFO_KIND: u16 = 1;

/// Interface info message (mirrors struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub ifi_pad: u8,
    pub ifi_type: u16,
    pub ifi_index: i32,
    pub ifi_flags: u32,
    pub ifi_change: u32,
}

/// Size of the ifinfomsg header.
pub const IFINFOMSG_LEN: usize = std::mem::size_of::<IfInfoMsg>();

/// Append the names of all WireGuard links to `names`.
///
/// An interrupted system call restarts the dump once; an interrupted dump
/// keeps whatever was collected.
pub fn list_wireguard_links(names: &mut NameList) -> Result<()> {
    let found = retry_interrupted(dump_links)?;
    names.extend_from(&found)
}

fn dump_links() -> Result<NameList> {
    let socket = NetlinkSocket::new(Protocol::Route)?;

    let mut request = MessageBuilder::new(
        NlMsgType::RTM_GETLINK,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP,
    );
    request.append(&IfInfoMsg {
        ifi_family: libc::AF_UNSPEC as u8,
        ..Default::default()
    });

    let mut names = NameList::new();
    let end = socket.dump(request, |header, payload| {
        if header.nlmsg_type != NlMsgType::RTM_NEWLINK {
            return Ok(());
        }
        if let Some(name) = wireguard_link_name(payload)? {
            names.add(name)?;
        }
        Ok(())
    })?;
    if end == DumpEnd::Interrupted {
        tracing::debug!(found = names.len(), "partial link dump");
    }
    Ok(names)
}

/// Extract the interface name from an `RTM_NEWLINK` payload if its kind is
/// `wireguard`.
fn wireguard_link_name(payload: &[u8]) -> Result<Option<&str>> {
    let Some(attrs) = payload.get(IFINFOMSG_LEN..) else {
        return Ok(None);
    };

    let mut name = None;
    let mut is_wireguard = false;
    for (attr_type, data) in AttrIter::new(attrs) {
        match attr_type {
            IFLA_IFNAME => name = Some(get::string(data)?),
            IFLA_LINKINFO => {
                is_wireguard = AttrIter::new(data).any(|(t, kind)| {
                    t == IFLA_INFO_KIND && get::string(kind).is_ok_and(|k| k == WG_LINK_KIND)
                });
            }
            _ => {}
        }
    }

    Ok(name.filter(|_| is_wireguard))
}
