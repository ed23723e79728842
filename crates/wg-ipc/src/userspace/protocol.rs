//! Text codec for the userspace control-socket protocol.
//!
//! Requests and responses are `key=value` lines terminated by a blank line.
//! A `set=1` request carries the full device description and is answered
//! with `errno=<n>`; a `get=1` request is answered with the device state
//! followed by `errno=<n>`.

use std::io::{BufRead, Write};
use std::net::{SocketAddr, ToSocketAddrs};

use super::parse::{
    parse_allowed_ip, parse_errno, parse_i64, parse_u16, parse_u32, parse_u64, split_endpoint,
    split_line,
};
use crate::device::{Device, Peer};
use crate::error::{Error, Result};
use crate::key;

/// Resolves endpoint text received from a daemon into a socket address.
pub trait Resolver: Send + Sync {
    /// Resolve `host` and `port` (a service name or number) to one address.
    fn resolve(&self, host: &str, port: &str) -> Result<SocketAddr>;
}

/// Resolver backed by the system name service.
///
/// Ports must be numeric; hosts may be names or literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: &str) -> Result<SocketAddr> {
        let unresolved = || Error::Unresolved {
            endpoint: format!("{}:{}", host, port),
        };

        let port: u16 = port.parse().map_err(|_| unresolved())?;
        (host, port)
            .to_socket_addrs()
            .map_err(|_| unresolved())?
            .next()
            .ok_or_else(unresolved)
    }
}

/// Write a complete `set=1` request for `device`.
pub fn write_set_request<W: Write>(device: &Device, mut w: W) -> Result<()> {
    writeln!(w, "set=1")?;

    if let Some(private) = device.get_private_key() {
        writeln!(w, "private_key={}", key::to_hex(private))?;
    }
    if let Some(port) = device.listen_port {
        writeln!(w, "listen_port={}", port)?;
    }
    if let Some(mark) = device.fwmark {
        writeln!(w, "fwmark={}", mark)?;
    }
    if device.replace_peers {
        writeln!(w, "replace_peers=true")?;
    }

    for peer in &device.peers {
        writeln!(w, "public_key={}", key::to_hex(&peer.public_key))?;
        if peer.remove {
            writeln!(w, "remove=true")?;
            continue;
        }
        if let Some(psk) = &peer.preshared_key {
            writeln!(w, "preshared_key={}", key::to_hex(psk))?;
        }
        if let Some(endpoint) = &peer.endpoint {
            // SocketAddr brackets v6 hosts already.
            writeln!(w, "endpoint={}", endpoint)?;
        }
        if let Some(interval) = peer.persistent_keepalive {
            writeln!(w, "persistent_keepalive_interval={}", interval)?;
        }
        if peer.replace_allowed_ips {
            writeln!(w, "replace_allowed_ips=true")?;
        }
        for ip in &peer.allowed_ips {
            writeln!(w, "allowed_ip={}", ip)?;
        }
    }

    writeln!(w)?;
    w.flush()?;
    Ok(())
}

/// Write a `get=1` request.
pub fn write_get_request<W: Write>(mut w: W) -> Result<()> {
    w.write_all(b"get=1\n\n")?;
    w.flush()?;
    Ok(())
}

/// Read one line into `line` without its terminating newline.
///
/// Returns `None` at end of stream. A final line without a newline, or one
/// that is not UTF-8, is a protocol error.
fn read_line<R: BufRead>(r: &mut R, line: &mut String) -> Result<Option<()>> {
    line.clear();
    let mut buf = Vec::new();
    if r.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.pop() != Some(b'\n') {
        return Err(Error::protocol("line not terminated by a newline"));
    }
    *line = String::from_utf8(buf).map_err(|_| Error::protocol("line is not valid UTF-8"))?;
    Ok(Some(()))
}

/// Read the response to a `set=1` request.
pub fn read_set_response<R: BufRead>(mut r: R) -> Result<()> {
    let mut line = String::new();
    if read_line(&mut r, &mut line)?.is_none() {
        return Err(Error::protocol("connection closed before errno"));
    }

    let errno = match split_line(&line)? {
        ("errno", value) => parse_errno(value)?,
        (field, _) => return Err(Error::protocol(format!("expected errno, got {:?}", field))),
    };

    // The trailing blank line may be missing if the daemon closes early.
    if read_line(&mut r, &mut line)?.is_some() && !line.is_empty() {
        return Err(Error::protocol("expected blank line after errno"));
    }

    match errno {
        0 => Ok(()),
        n => Err(Error::from_errno(n)),
    }
}

/// Parse the response to a `get=1` request into a device called `name`.
pub fn read_get_response<R: BufRead>(mut r: R, name: &str, resolver: &dyn Resolver) -> Result<Device> {
    let mut device = Device::new(name);
    let mut peer: Option<Peer> = None;
    let mut errno = 0;
    let mut line = String::new();

    loop {
        if read_line(&mut r, &mut line)?.is_none() {
            return Err(Error::protocol("connection closed before end of response"));
        }
        if line.is_empty() {
            break;
        }

        let (field, value) = split_line(&line)?;
        match field {
            "errno" => {
                errno = parse_errno(value)?;
                continue;
            }
            "public_key" => {
                device.peers.extend(peer.take());
                peer = Some(Peer::new(key::from_hex(value)?));
                continue;
            }
            _ => {}
        }

        match (field, peer.as_mut()) {
            ("private_key", None) => {
                let private = key::from_hex(value)?;
                device.set_private_key((!key::is_zero(&private)).then_some(private));
            }
            ("listen_port", None) => device.listen_port = Some(parse_u16(value)?),
            ("fwmark", None) => device.fwmark = Some(parse_u32(value)?),
            ("preshared_key", Some(p)) => {
                let psk = key::from_hex(value)?;
                p.preshared_key = (!key::is_zero(&psk)).then_some(psk);
            }
            ("endpoint", Some(p)) => {
                let (host, port) = split_endpoint(value)?;
                p.endpoint = Some(resolver.resolve(host, port)?);
            }
            ("persistent_keepalive_interval", Some(p)) => {
                p.persistent_keepalive = Some(parse_u16(value)?);
            }
            ("allowed_ip", Some(p)) => p.allowed_ips.push(parse_allowed_ip(value)?),
            ("last_handshake_time_sec", Some(p)) => p.last_handshake.sec = parse_i64(value)?,
            ("last_handshake_time_nsec", Some(p)) => p.last_handshake.nsec = parse_i64(value)?,
            ("rx_bytes", Some(p)) => p.rx_bytes = parse_u64(value)?,
            ("tx_bytes", Some(p)) => p.tx_bytes = parse_u64(value)?,
            ("protocol_version", Some(p)) => p.protocol_version = Some(parse_u32(value)?),
            (field, Some(_)) => {
                return Err(Error::protocol(format!("unexpected peer key {:?}", field)));
            }
            (field, None) => {
                return Err(Error::protocol(format!("unexpected device key {:?}", field)));
            }
        }
    }
    device.peers.extend(peer);

    match errno {
        0 => Ok(device),
        n => Err(Error::from_errno(n)),
    }
}
