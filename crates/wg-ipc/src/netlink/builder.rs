//! Message builder for constructing netlink messages.
//!
//! A builder may carry a capacity limit. The `try_*` methods refuse to grow
//! the message past it and leave the buffer untouched when they do, so a
//! caller can close what it has open and carry on in a fresh message.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    capacity: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_limit(msg_type, flags, usize::MAX)
    }

    /// Create a builder whose `try_*` methods keep the message within `capacity` bytes.
    pub fn with_limit(msg_type: u16, flags: u16, capacity: usize) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf, capacity }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Capacity limit for the `try_*` methods.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a fixed-size header struct to the message.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        let attr = NlAttr::new(attr_type, data.len());
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) {
        self.append_attr(attr_type, &[value]);
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.append_attr(attr_type, &data);
    }

    /// Check whether an attribute with `payload_len` bytes still fits.
    pub fn fits(&self, payload_len: usize) -> bool {
        self.buf.len() + NLA_HDRLEN + nla_align(payload_len) <= self.capacity
    }

    /// Append an attribute if it fits. Returns `false` and leaves the
    /// message untouched otherwise.
    pub fn try_append_attr(&mut self, attr_type: u16, data: &[u8]) -> bool {
        if !self.fits(data.len()) {
            return false;
        }
        self.append_attr(attr_type, data);
        true
    }

    /// Append a u8 attribute if it fits.
    pub fn try_append_attr_u8(&mut self, attr_type: u16, value: u8) -> bool {
        self.try_append_attr(attr_type, &[value])
    }

    /// Append a u16 attribute (native endian) if it fits.
    pub fn try_append_attr_u16(&mut self, attr_type: u16, value: u16) -> bool {
        self.try_append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u32 attribute (native endian) if it fits.
    pub fn try_append_attr_u32(&mut self, attr_type: u16, value: u32) -> bool {
        self.try_append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.buf.extend_from_slice(attr.as_bytes());
        NestToken { offset }
    }

    /// Start a nested attribute if its header fits.
    pub fn try_nest_start(&mut self, attr_type: u16) -> Option<NestToken> {
        if self.buf.len() + NLA_HDRLEN > self.capacity {
            return None;
        }
        Some(self.nest_start(attr_type))
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = self.buf.len() - token.offset;
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset] = len_bytes[0];
        self.buf[token.offset + 1] = len_bytes[1];
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Drop a nested attribute and everything appended since it was started.
    pub fn nest_cancel(&mut self, token: NestToken) {
        self.buf.truncate(token.offset);
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
