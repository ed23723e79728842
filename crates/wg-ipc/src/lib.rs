//! WireGuard configuration transport.
//!
//! Reads and writes the configuration of WireGuard interfaces (keys, listen
//! port, fwmark, peers and their allowed IPs) and enumerates the interfaces
//! that exist. Three transports provide the same three operations:
//!
//! - the Linux kernel module over generic netlink (enumeration over
//!   route netlink);
//! - OpenBSD's `wg(4)` over ioctls;
//! - userspace implementations over a text protocol on a UNIX socket in
//!   `/var/run/wireguard`.
//!
//! A running userspace daemon always takes precedence over the kernel for
//! an interface name.
//!
//! # Example
//!
//! ```ignore
//! use wg_ipc::{AllowedIp, Device, Peer};
//!
//! for name in wg_ipc::list_interfaces()?.iter() {
//!     let device = wg_ipc::get_device(name)?;
//!     println!("{}: listening on {:?}", name, device.listen_port);
//! }
//!
//! let device = Device::new("wg0")
//!     .listen_port(51820)
//!     .peer(
//!         Peer::new(peer_key)
//!             .endpoint("192.0.2.1:51820".parse()?)
//!             .allowed_ip(AllowedIp::v4("10.0.0.0".parse()?, 24)),
//!     );
//! wg_ipc::set_device(&device)?;
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod ioctl;
pub mod key;
pub mod names;
pub mod userspace;

#[cfg(target_os = "linux")]
pub mod netlink;

pub use backend::{ConfigTransport, WgApi};
pub use config::IpcConfig;
pub use device::{AllowedIp, Device, Peer, Timespec};
pub use error::{Error, Result};
pub use key::Key;
pub use names::NameList;
pub use userspace::{Resolver, SystemResolver, UserspaceTransport};

#[cfg(target_os = "linux")]
pub use netlink::NetlinkTransport;

#[cfg(target_os = "openbsd")]
pub use ioctl::IoctlTransport;

/// List every WireGuard interface: kernel interfaces first, then those
/// served by userspace daemons.
pub fn list_interfaces() -> Result<NameList> {
    WgApi::new().list_interfaces()
}

/// Fetch the configuration of the interface `name`.
pub fn get_device(name: &str) -> Result<Device> {
    WgApi::new().get_device(name)
}

/// Apply `device` to the interface named `device.name`.
pub fn set_device(device: &Device) -> Result<()> {
    WgApi::new().set_device(device)
}
