//! Value grammar of the control-socket protocol.
//!
//! Every parser here must consume its whole input; trailing characters are
//! a protocol error, as are signs and whitespace in numbers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::ascii::digit1;
use winnow::combinator::{delimited, separated_pair};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use crate::device::AllowedIp;
use crate::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Largest accepted `errno=` value.
pub const ERRNO_MAX: u64 = 0x7fff_ffff;

fn key_value<'a>(input: &mut &'a str) -> PResult<(&'a str, &'a str)> {
    separated_pair(take_till(1.., '='), '=', take_while(0.., |_: char| true)).parse_next(input)
}

fn decimal<'a>(input: &mut &'a str) -> PResult<&'a str> {
    digit1.parse_next(input)
}

fn bracketed_endpoint<'a>(input: &mut &'a str) -> PResult<(&'a str, &'a str)> {
    separated_pair(
        delimited('[', take_till(1.., ']'), ']'),
        ':',
        take_while(1.., |_: char| true),
    )
    .parse_next(input)
}

fn prefix<'a>(input: &mut &'a str) -> PResult<(&'a str, &'a str)> {
    separated_pair(take_till(1.., '/'), '/', decimal).parse_next(input)
}

/// Split a `key=value` line (without its newline) at the first `=`.
pub fn split_line(line: &str) -> Result<(&str, &str)> {
    key_value
        .parse(line)
        .map_err(|_| Error::protocol(format!("malformed line {:?}", line)))
}

/// Parse an unsigned decimal number no larger than `max`.
pub fn number(value: &str, max: u64) -> Result<u64> {
    let digits = decimal
        .parse(value)
        .map_err(|_| Error::protocol(format!("invalid number {:?}", value)))?;
    digits
        .parse::<u64>()
        .ok()
        .filter(|n| *n <= max)
        .ok_or_else(|| Error::protocol(format!("number {} out of range (max {})", value, max)))
}

/// Parse a u16 field.
pub fn parse_u16(value: &str) -> Result<u16> {
    Ok(number(value, u16::MAX.into())? as u16)
}

/// Parse a u32 field.
pub fn parse_u32(value: &str) -> Result<u32> {
    Ok(number(value, u32::MAX.into())? as u32)
}

/// Parse a u64 field.
pub fn parse_u64(value: &str) -> Result<u64> {
    number(value, u64::MAX)
}

/// Parse a non-negative i64 field.
pub fn parse_i64(value: &str) -> Result<i64> {
    Ok(number(value, i64::MAX as u64)? as i64)
}

/// Parse an `errno=` value.
pub fn parse_errno(value: &str) -> Result<i32> {
    Ok(number(value, ERRNO_MAX)? as i32)
}

/// Split an endpoint into host and port text.
///
/// `[host]:port` is required for hosts containing `:`; otherwise the value
/// is split at the last colon.
pub fn split_endpoint(value: &str) -> Result<(&str, &str)> {
    let malformed = || Error::protocol(format!("malformed endpoint {:?}", value));

    if value.starts_with('[') {
        return bracketed_endpoint.parse(value).map_err(|_| malformed());
    }

    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !port.is_empty() => Ok((host, port)),
        _ => Err(malformed()),
    }
}

/// Parse an `address/cidr` allowed IP.
///
/// The family is picked by the presence of `:` in the address.
pub fn parse_allowed_ip(value: &str) -> Result<AllowedIp> {
    let malformed = || Error::protocol(format!("malformed allowed IP {:?}", value));

    let (ip, mask) = prefix.parse(value).map_err(|_| malformed())?;
    let addr = if ip.contains(':') {
        ip.parse::<Ipv6Addr>().map(IpAddr::V6).map_err(|_| malformed())?
    } else {
        ip.parse::<Ipv4Addr>().map(IpAddr::V4).map_err(|_| malformed())?
    };
    let cidr = number(mask, 128).map_err(|_| malformed())? as u8;

    AllowedIp::new(addr, cidr).ok_or_else(malformed)
}
