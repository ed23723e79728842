//! OpenBSD kernel transport over `wg(4)` ioctls.
//!
//! Devices are read with SIOCGWG and written with SIOCSWG, both taking a
//! `struct wg_data_io` that points at a caller-sized buffer (see
//! [`layout`]). Interfaces are enumerated as members of the `wg` interface
//! group. Each call opens its own datagram socket for the ioctls.

#![cfg_attr(not(target_os = "openbsd"), allow(dead_code))]

pub mod layout;

pub use layout::{pack_device, packed_size, unpack_device};

use crate::device::IFNAMSIZ;

/// Interface group every `wg(4)` interface belongs to.
pub const WG_GROUP: &str = "wg";

const IOC_INOUT: u32 = 0x8000_0000 | 0x4000_0000;
const IOCPARM_MASK: u32 = 0x1fff;

/// BSD `_IOWR(group, num, len)`.
const fn iowr(group: u8, num: u8, len: usize) -> u32 {
    IOC_INOUT | (((len as u32) & IOCPARM_MASK) << 16) | ((group as u32) << 8) | num as u32
}

/// Size of `struct wg_data_io` (name, size, pointer).
const WG_DATA_IO_LEN: usize = IFNAMSIZ + 8 + 8;
/// Size of `struct ifgroupreq` (name, length, 16-byte union).
const IFGROUPREQ_LEN: usize = IFNAMSIZ + 8 + 16;
/// Size of `struct ifg_req`.
const IFG_REQ_LEN: usize = IFNAMSIZ;

/// Write a device configuration.
pub const SIOCSWG: u32 = iowr(b'i', 210, WG_DATA_IO_LEN);
/// Read a device configuration.
pub const SIOCGWG: u32 = iowr(b'i', 211, WG_DATA_IO_LEN);
/// List the members of an interface group.
pub const SIOCGIFGMEMB: u32 = iowr(b'i', 138, IFGROUPREQ_LEN);

/// Copy an interface name into a fixed, NUL-terminated field.
fn ifname_field(name: &str) -> [u8; IFNAMSIZ] {
    let mut field = [0u8; IFNAMSIZ];
    let len = name.len().min(IFNAMSIZ - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

/// Read an interface name out of a fixed, NUL-padded field.
fn ifname_from_field(field: &[u8; IFNAMSIZ]) -> Option<&str> {
    let len = field.iter().position(|&b| b == 0).unwrap_or(IFNAMSIZ);
    std::str::from_utf8(&field[..len])
        .ok()
        .filter(|name| !name.is_empty())
}

#[cfg(target_os = "openbsd")]
mod sys {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    use super::*;
    use crate::backend::ConfigTransport;
    use crate::device::{Device, validate_ifname};
    use crate::error::Result;
    use crate::names::NameList;

    #[repr(C)]
    struct WgDataIo {
        wgd_name: [u8; IFNAMSIZ],
        wgd_size: usize,
        wgd_interface: *mut u8,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct IfgReq {
        ifgrq_member: [u8; IFNAMSIZ],
    }

    #[repr(C)]
    struct IfGroupReq {
        ifgr_name: [u8; IFNAMSIZ],
        ifgr_len: u32,
        ifgr_groups: *mut IfgReq,
        _union_tail: [u8; 8],
    }

    fn dgram_socket() -> Result<OwnedFd> {
        // SAFETY: plain socket(2) call; the descriptor is owned below.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: fd was just returned by socket(2) and is not owned elsewhere.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Issue an ioctl whose argument is a `#[repr(C)]` request structure.
    ///
    /// # Safety
    ///
    /// `arg` must be the structure `request` expects, with any embedded
    /// pointer valid for the length it advertises.
    unsafe fn ioctl<T>(socket: &OwnedFd, request: u32, arg: &mut T) -> io::Result<()> {
        // SAFETY: upheld by the caller.
        let ret = unsafe {
            libc::ioctl(
                socket.as_raw_fd(),
                request as libc::c_ulong,
                arg as *mut T as *mut libc::c_void,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Kernel transport for OpenBSD's `wg(4)`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct IoctlTransport;

    impl IoctlTransport {
        /// Create the transport.
        pub fn new() -> Self {
            Self
        }
    }

    impl ConfigTransport for IoctlTransport {
        fn list_interfaces(&self, names: &mut NameList) -> Result<()> {
            let socket = dgram_socket()?;
            let mut req = IfGroupReq {
                ifgr_name: ifname_field(WG_GROUP),
                ifgr_len: 0,
                ifgr_groups: std::ptr::null_mut(),
                _union_tail: [0; 8],
            };

            // SAFETY: a null group buffer asks the kernel for the needed length.
            if let Err(e) = unsafe { ioctl(&socket, SIOCGIFGMEMB, &mut req) } {
                if e.raw_os_error() == Some(libc::ENOENT) {
                    return Ok(());
                }
                return Err(e.into());
            }

            let count = req.ifgr_len as usize / IFG_REQ_LEN;
            let mut members = vec![IfgReq { ifgrq_member: [0; IFNAMSIZ] }; count];
            req.ifgr_len = (count * IFG_REQ_LEN) as u32;
            req.ifgr_groups = members.as_mut_ptr();
            // SAFETY: `members` holds exactly `ifgr_len` bytes and outlives the call.
            unsafe { ioctl(&socket, SIOCGIFGMEMB, &mut req) }?;

            let filled = (req.ifgr_len as usize / IFG_REQ_LEN).min(count);
            for member in &members[..filled] {
                if let Some(name) = ifname_from_field(&member.ifgrq_member) {
                    names.add(name)?;
                }
            }
            Ok(())
        }

        fn get_device(&self, name: &str) -> Result<Device> {
            validate_ifname(name)?;
            let socket = dgram_socket()?;

            let mut buf: Vec<u8> = Vec::new();
            let mut data = WgDataIo {
                wgd_name: ifname_field(name),
                wgd_size: 0,
                wgd_interface: std::ptr::null_mut(),
            };
            loop {
                let last_size = data.wgd_size;
                data.wgd_interface = if buf.is_empty() {
                    std::ptr::null_mut()
                } else {
                    buf.as_mut_ptr()
                };
                // SAFETY: `buf` is exactly `wgd_size` bytes long (or the pointer is null
                // with size 0) and stays alive across the call.
                unsafe { ioctl(&socket, SIOCGWG, &mut data) }?;
                if data.wgd_size <= last_size {
                    break;
                }
                tracing::debug!(ifname = name, size = data.wgd_size, "growing SIOCGWG buffer");
                buf.resize(data.wgd_size, 0);
            }

            let filled = data.wgd_size.min(buf.len());
            unpack_device(name, &buf[..filled])
        }

        fn set_device(&self, device: &Device) -> Result<()> {
            validate_ifname(&device.name)?;
            let socket = dgram_socket()?;

            let mut buf = pack_device(device);
            let mut data = WgDataIo {
                wgd_name: ifname_field(&device.name),
                wgd_size: buf.len(),
                wgd_interface: buf.as_mut_ptr(),
            };
            // SAFETY: `buf` is `wgd_size` bytes long and stays alive across the call.
            unsafe { ioctl(&socket, SIOCSWG, &mut data) }?;
            Ok(())
        }
    }
}

#[cfg(target_os = "openbsd")]
pub use sys::IoctlTransport;
