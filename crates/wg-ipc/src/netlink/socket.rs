//! Blocking netlink socket operations.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::builder::MessageBuilder;
use super::message::{MessageIter, NlMsgError, NlMsgHdr};
use crate::error::{Error, Result};

/// Receive buffer size. Large enough for any single kernel dump skb.
const RECV_BUF_SIZE: usize = 32768;

/// Netlink protocol families used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Routing/device hook (link enumeration).
    Route,
    /// Generic netlink (WireGuard configuration).
    Generic,
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Generic => protocols::NETLINK_GENERIC,
        }
    }
}

/// How a dump ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpEnd {
    /// The kernel sent `NLMSG_DONE`.
    Complete,
    /// A reply carried `NLM_F_DUMP_INTR`; what was collected before it is partial.
    Interrupted,
}

/// Blocking netlink socket, closed on drop.
pub struct NetlinkSocket {
    socket: Socket,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
    protocol: Protocol,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        let mut socket = Socket::new(protocol.as_isize())?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Extended ACK is only a nicety; older kernels refuse it.
        socket.set_ext_ack(true).ok();

        Ok(Self {
            socket,
            seq: AtomicU32::new(1),
            pid,
            protocol,
        })
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Send a message.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        self.socket.send(msg, 0)?;
        Ok(())
    }

    /// Receive one datagram.
    pub fn recv_msg(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
        self.socket.recv(&mut buf, 0)?;
        Ok(buf)
    }

    /// Stamp a request with a fresh sequence number and our port ID, then send it.
    fn send_request(&self, mut builder: MessageBuilder) -> Result<u32> {
        let seq = self.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.pid);
        self.send(&builder.finish())?;
        Ok(seq)
    }

    /// Send a request flagged `NLM_F_ACK` and wait for its acknowledgement.
    pub fn request_ack(&self, builder: MessageBuilder) -> Result<()> {
        let seq = self.send_request(builder)?;
        loop {
            let data = self.recv_msg()?;
            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }
                if header.is_error() {
                    return NlMsgError::from_bytes(payload)?.to_result();
                }
            }
        }
    }

    /// Send a request and hand each reply that belongs to it to `on_reply`.
    ///
    /// Used both for dumps and for single-reply requests; reading stops at
    /// `NLMSG_DONE`, at an error or ACK, or at the first reply flagged
    /// `NLM_F_DUMP_INTR`, which is not passed on.
    pub fn dump(
        &self,
        builder: MessageBuilder,
        mut on_reply: impl FnMut(&NlMsgHdr, &[u8]) -> Result<()>,
    ) -> Result<DumpEnd> {
        let seq = self.send_request(builder)?;
        loop {
            let data = self.recv_msg()?;
            if let Some(end) = process_replies(&data, seq, &mut on_reply)? {
                return Ok(end);
            }
        }
    }
}

/// Handle the messages of one received datagram.
///
/// Returns `Some` once the reply stream for `seq` has ended, `None` if more
/// datagrams are expected.
fn process_replies(
    data: &[u8],
    seq: u32,
    on_reply: &mut impl FnMut(&NlMsgHdr, &[u8]) -> Result<()>,
) -> Result<Option<DumpEnd>> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;
        if header.nlmsg_seq != seq {
            continue;
        }
        if header.is_dump_interrupted() {
            tracing::warn!(seq, "netlink dump interrupted, keeping partial result");
            return Ok(Some(DumpEnd::Interrupted));
        }
        if header.is_error() {
            NlMsgError::from_bytes(payload)?.to_result()?;
            return Ok(Some(DumpEnd::Complete));
        }
        if header.is_done() {
            if let Some(status) = payload.get(..4) {
                let errno = i32::from_ne_bytes([status[0], status[1], status[2], status[3]]);
                if errno < 0 {
                    return Err(Error::from_errno(errno));
                }
            }
            return Ok(Some(DumpEnd::Complete));
        }
        on_reply(header, payload)?;
    }
    Ok(None)
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// Run `op` and, if it fails with EINTR, run it exactly once more.
pub fn retry_interrupted<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(e) if e.is_interrupted() => {
            tracing::debug!("netlink operation interrupted, retrying once");
            op()
        }
        other => other,
    }
}
