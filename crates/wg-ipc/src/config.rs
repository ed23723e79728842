//! Transport configuration.

use std::path::{Path, PathBuf};

/// Directory userspace implementations create their control sockets in.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

/// File name suffix of a control socket (`<iface>.sock`).
pub const DEFAULT_SOCKET_SUFFIX: &str = ".sock";

/// Settings shared by the transports.
///
/// ```ignore
/// let config = IpcConfig::new()
///     .socket_dir("/run/wireguard")
///     .message_capacity(4096);
/// let api = WgApi::with_config(&config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcConfig {
    socket_dir: PathBuf,
    socket_suffix: String,
    message_capacity: Option<usize>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            socket_suffix: DEFAULT_SOCKET_SUFFIX.to_string(),
            message_capacity: None,
        }
    }

    /// Set the control socket directory.
    pub fn socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    /// Set the control socket file suffix.
    pub fn socket_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.socket_suffix = suffix.into();
        self
    }

    /// Set the netlink message capacity used to split SET_DEVICE requests.
    ///
    /// Defaults to the page size, capped at 8 KiB. Values above 65535 are
    /// clamped, since netlink attribute lengths are 16-bit.
    pub fn message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = Some(capacity);
        self
    }

    /// The control socket directory.
    pub fn get_socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// The control socket file suffix.
    pub fn get_socket_suffix(&self) -> &str {
        &self.socket_suffix
    }

    /// The configured netlink message capacity, if any.
    pub fn get_message_capacity(&self) -> Option<usize> {
        self.message_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IpcConfig::default();
        assert_eq!(config.get_socket_dir(), Path::new("/var/run/wireguard"));
        assert_eq!(config.get_socket_suffix(), ".sock");
        assert_eq!(config.get_message_capacity(), None);
    }

    #[test]
    fn test_builder() {
        let config = IpcConfig::new()
            .socket_dir("/tmp/wg")
            .socket_suffix(".ctl")
            .message_capacity(1024);
        assert_eq!(config.get_socket_dir(), Path::new("/tmp/wg"));
        assert_eq!(config.get_socket_suffix(), ".ctl");
        assert_eq!(config.get_message_capacity(), Some(1024));
    }
}
