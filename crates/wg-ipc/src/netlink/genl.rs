//! Generic Netlink (GENL) header and family resolution.
//!
//! GENL messages have an additional header after the standard netlink header:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! │   nlmsg_len, nlmsg_type (family_id),    │
//! │   nlmsg_flags, nlmsg_seq, nlmsg_pid     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::message::{NLM_F_ACK, NLM_F_REQUEST};
use super::socket::NetlinkSocket;
use crate::error::{Error, Result};

/// Control family ID (fixed, not dynamically assigned).
pub const GENL_ID_CTRL: u16 = 0x10;

/// `CTRL_CMD_GETFAMILY`.
pub const CTRL_CMD_GETFAMILY: u8 = 3;

/// `CTRL_ATTR_FAMILY_ID`.
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
/// `CTRL_ATTR_FAMILY_NAME`.
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

/// Generic Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
    /// Reserved for future use
    pub reserved: u16,
}

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }
}

/// Start a GENL request: netlink header plus genlmsghdr.
pub fn genl_request(family_id: u16, flags: u16, cmd: u8, version: u8) -> MessageBuilder {
    genl_request_limited(family_id, flags, cmd, version, usize::MAX)
}

/// Start a GENL request whose `try_*` appends stay within `capacity` bytes.
pub fn genl_request_limited(
    family_id: u16,
    flags: u16,
    cmd: u8,
    version: u8,
    capacity: usize,
) -> MessageBuilder {
    let mut builder = MessageBuilder::with_limit(family_id, flags, capacity);
    builder.append(&GenlMsgHdr::new(cmd, version));
    builder
}

/// Strip the genlmsghdr from a reply payload.
pub fn genl_attrs(payload: &[u8]) -> Result<&[u8]> {
    payload.get(GENL_HDRLEN..).ok_or(Error::Truncated {
        expected: GENL_HDRLEN,
        actual: payload.len(),
    })
}

/// Look up the dynamically assigned ID of a GENL family.
///
/// An unregistered family (module not loaded) is reported as
/// [`Error::FamilyNotFound`].
pub fn resolve_family(socket: &NetlinkSocket, name: &str) -> Result<u16> {
    let mut builder = genl_request(
        GENL_ID_CTRL,
        NLM_F_REQUEST | NLM_F_ACK,
        CTRL_CMD_GETFAMILY,
        1,
    );
    builder.append_attr_str(CTRL_ATTR_FAMILY_NAME, name);

    let mut id = None;
    let result = socket.dump(builder, |_, payload| {
        if id.is_none() {
            id = parse_family_id(genl_attrs(payload)?)?;
        }
        Ok(())
    });

    match result {
        Err(e) if e.errno() == libc::ENOENT => Err(Error::FamilyNotFound {
            name: name.to_string(),
        }),
        Err(e) => Err(e),
        Ok(_) => id.ok_or_else(|| Error::FamilyNotFound {
            name: name.to_string(),
        }),
    }
}

/// Find `CTRL_ATTR_FAMILY_ID` in a GETFAMILY reply.
fn parse_family_id(attrs: &[u8]) -> Result<Option<u16>> {
    for (attr_type, payload) in AttrIter::new(attrs) {
        if attr_type == CTRL_ATTR_FAMILY_ID {
            return get::u16_ne(payload).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::NLMSG_HDRLEN;

    #[test]
    fn test_genl_header_size() {
        assert_eq!(GENL_HDRLEN, 4);
    }

    #[test]
    fn test_genl_request_layout() {
        let mut builder = genl_request(GENL_ID_CTRL, NLM_F_REQUEST, CTRL_CMD_GETFAMILY, 1);
        builder.append_attr_str(CTRL_ATTR_FAMILY_NAME, "wireguard");
        let msg = builder.finish();

        assert_eq!(msg[NLMSG_HDRLEN], CTRL_CMD_GETFAMILY);
        assert_eq!(msg[NLMSG_HDRLEN + 1], 1);
        let attrs: Vec<_> = AttrIter::new(&msg[NLMSG_HDRLEN + GENL_HDRLEN..]).collect();
        assert_eq!(attrs[0].0, CTRL_ATTR_FAMILY_NAME);
        assert_eq!(get::string(attrs[0].1).unwrap(), "wireguard");
    }

    #[test]
    fn test_parse_family_id() {
        let mut builder = MessageBuilder::new(0, 0);
        builder.append_attr_str(CTRL_ATTR_FAMILY_NAME, "wireguard");
        builder.append_attr_u16(CTRL_ATTR_FAMILY_ID, 27);
        let msg = builder.finish();
        assert_eq!(parse_family_id(&msg[NLMSG_HDRLEN..]).unwrap(), Some(27));
        assert_eq!(parse_family_id(&[]).unwrap(), None);
    }

    #[test]
    fn test_genl_attrs_truncated() {
        assert!(genl_attrs(&[1, 2]).is_err());
        assert_eq!(genl_attrs(&[1, 2, 0, 0, 9]).unwrap(), &[9]);
    }
}
