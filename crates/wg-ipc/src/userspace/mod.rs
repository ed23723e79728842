//! Userspace transport: a `key=value` text protocol over a UNIX stream
//! socket at `<socket_dir>/<iface>.sock`.
//!
//! Each operation connects, exchanges one request and response, and drops
//! the connection.

pub mod parse;
pub mod protocol;

pub use protocol::{Resolver, SystemResolver};

use std::fs;
use std::io::{self, BufReader};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::backend::ConfigTransport;
use crate::config::IpcConfig;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::names::NameList;

/// Control-socket transport for userspace implementations.
pub struct UserspaceTransport {
    socket_dir: PathBuf,
    socket_suffix: String,
    resolver: Box<dyn Resolver>,
}

impl std::fmt::Debug for UserspaceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserspaceTransport")
            .field("socket_dir", &self.socket_dir)
            .field("socket_suffix", &self.socket_suffix)
            .finish_non_exhaustive()
    }
}

impl Default for UserspaceTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UserspaceTransport {
    /// Create a transport with the default socket directory and the system
    /// resolver.
    pub fn new() -> Self {
        Self::with_config(&IpcConfig::default())
    }

    /// Create a transport from a configuration.
    pub fn with_config(config: &IpcConfig) -> Self {
        Self {
            socket_dir: config.get_socket_dir().to_path_buf(),
            socket_suffix: config.get_socket_suffix().to_string(),
            resolver: Box::new(SystemResolver),
        }
    }

    /// Replace the endpoint resolver.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Directory scanned for control sockets.
    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// Path of the control socket for `name`.
    ///
    /// Names containing `/` are rejected so they cannot escape the socket
    /// directory.
    pub fn socket_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(self
            .socket_dir
            .join(format!("{}{}", name, self.socket_suffix)))
    }

    /// Connect to the control socket for `name`.
    ///
    /// Fails with ENOENT if the path does not exist and EBADF if it is not a
    /// socket. A socket nobody listens on is removed.
    pub fn connect(&self, name: &str) -> Result<UnixStream> {
        let path = self.socket_path(name)?;
        let meta = fs::metadata(&path)?;
        if !meta.file_type().is_socket() {
            return Err(io::Error::from_raw_os_error(libc::EBADF).into());
        }

        match UnixStream::connect(&path) {
            Ok(stream) => {
                tracing::debug!(path = %path.display(), "connected to control socket");
                Ok(stream)
            }
            Err(e) => {
                if e.raw_os_error() == Some(libc::ECONNREFUSED) {
                    remove_stale_socket(&path);
                }
                Err(e.into())
            }
        }
    }

    /// Check whether a live daemon serves `name`.
    ///
    /// Only a refused connection counts as dead (and removes the stale
    /// socket); any other connect failure still reports the interface.
    pub fn is_live(&self, name: &str) -> bool {
        let Ok(path) = self.socket_path(name) else {
            return false;
        };
        match fs::metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {}
            _ => return false,
        }

        match UnixStream::connect(&path) {
            Ok(_) => true,
            Err(e) if e.raw_os_error() == Some(libc::ECONNREFUSED) => {
                remove_stale_socket(&path);
                false
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "control socket probe failed");
                true
            }
        }
    }

    fn interface_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_suffix(self.socket_suffix.as_str())
            .filter(|name| !name.is_empty())
    }
}

fn remove_stale_socket(path: &Path) {
    tracing::warn!(path = %path.display(), "removing stale control socket");
    if let Err(e) = fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove stale socket");
    }
}

impl ConfigTransport for UserspaceTransport {
    fn list_interfaces(&self, names: &mut NameList) -> Result<()> {
        let entries = match fs::read_dir(&self.socket_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|f| self.interface_name(f)) else {
                continue;
            };
            if self.is_live(name) {
                names.add(name)?;
            }
        }
        Ok(())
    }

    fn get_device(&self, name: &str) -> Result<Device> {
        let stream = self.connect(name)?;
        protocol::write_get_request(&stream)?;
        protocol::read_get_response(BufReader::new(&stream), name, self.resolver.as_ref())
    }

    fn set_device(&self, device: &Device) -> Result<()> {
        let stream = self.connect(&device.name)?;
        protocol::write_set_request(device, &stream)?;
        protocol::read_set_response(BufReader::new(&stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> UserspaceTransport {
        UserspaceTransport::with_config(&IpcConfig::new().socket_dir("/nonexistent/wg"))
    }

    #[test]
    fn test_socket_path() {
        let t = transport();
        assert_eq!(
            t.socket_path("wg0").unwrap(),
            PathBuf::from("/nonexistent/wg/wg0.sock")
        );
        assert_eq!(t.socket_path("../x").unwrap_err().errno(), libc::EINVAL);
        assert_eq!(t.socket_path("").unwrap_err().errno(), libc::EINVAL);
    }

    #[test]
    fn test_interface_name() {
        let t = transport();
        assert_eq!(t.interface_name("wg0.sock"), Some("wg0"));
        assert_eq!(t.interface_name(".sock"), None);
        assert_eq!(t.interface_name("wg0.pid"), None);
        assert_eq!(t.interface_name("sock"), None);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let mut names = NameList::new();
        transport().list_interfaces(&mut names).unwrap();
        assert!(names.is_empty());
        assert_eq!(names.as_bytes(), b"\0");
    }

    #[test]
    fn test_missing_socket() {
        let t = transport();
        assert!(!t.is_live("wg0"));
        assert!(t.connect("wg0").unwrap_err().is_not_found());
    }
}
