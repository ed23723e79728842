//! Backend selection.
//!
//! A userspace daemon's control socket always wins over the kernel: the
//! socket is probed on every get/set, and only when nothing answers there
//! does the request go to the platform's kernel transport.

use crate::config::IpcConfig;
use crate::device::Device;
use crate::error::Result;
use crate::names::NameList;
use crate::userspace::UserspaceTransport;

/// The three operations every configuration backend provides.
pub trait ConfigTransport: Send + Sync {
    /// Append the names of the interfaces this backend manages to `names`.
    fn list_interfaces(&self, names: &mut NameList) -> Result<()>;

    /// Fetch the full configuration and state of `name`.
    fn get_device(&self, name: &str) -> Result<Device>;

    /// Apply `device` to the interface named `device.name`.
    fn set_device(&self, device: &Device) -> Result<()>;
}

/// Dispatches operations to the userspace or kernel transport.
///
/// # Example
///
/// ```ignore
/// use wg_ipc::WgApi;
///
/// let api = WgApi::new();
/// for name in api.list_interfaces()?.iter() {
///     let device = api.get_device(name)?;
///     println!("{}: {} peers", name, device.peers.len());
/// }
/// ```
pub struct WgApi {
    userspace: UserspaceTransport,
    kernel: Option<Box<dyn ConfigTransport>>,
}

impl std::fmt::Debug for WgApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgApi")
            .field("userspace", &self.userspace)
            .field("kernel", &self.kernel.is_some())
            .finish()
    }
}

impl Default for WgApi {
    fn default() -> Self {
        Self::new()
    }
}

impl WgApi {
    /// Create a dispatcher with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&IpcConfig::default())
    }

    /// Create a dispatcher from a configuration.
    pub fn with_config(config: &IpcConfig) -> Self {
        Self {
            userspace: UserspaceTransport::with_config(config),
            kernel: platform_kernel(config),
        }
    }

    /// Replace the userspace transport.
    pub fn with_userspace(mut self, userspace: UserspaceTransport) -> Self {
        self.userspace = userspace;
        self
    }

    /// Replace the kernel transport.
    pub fn with_kernel(mut self, kernel: impl ConfigTransport + 'static) -> Self {
        self.kernel = Some(Box::new(kernel));
        self
    }

    /// Remove the kernel transport; only userspace daemons are used.
    pub fn without_kernel(mut self) -> Self {
        self.kernel = None;
        self
    }

    /// The userspace transport.
    pub fn userspace(&self) -> &UserspaceTransport {
        &self.userspace
    }

    /// Whether a kernel transport is available.
    pub fn has_kernel(&self) -> bool {
        self.kernel.is_some()
    }

    /// List kernel interfaces followed by userspace interfaces.
    ///
    /// The two sources are independent; a name present in both is reported
    /// twice.
    pub fn list_interfaces(&self) -> Result<NameList> {
        let mut names = NameList::new();
        if let Some(kernel) = &self.kernel {
            kernel.list_interfaces(&mut names)?;
        }
        self.userspace.list_interfaces(&mut names)?;
        Ok(names)
    }

    /// Fetch the configuration of `name`.
    pub fn get_device(&self, name: &str) -> Result<Device> {
        self.select(name).get_device(name)
    }

    /// Apply `device`.
    pub fn set_device(&self, device: &Device) -> Result<()> {
        self.select(&device.name).set_device(device)
    }

    fn select(&self, name: &str) -> &dyn ConfigTransport {
        if self.userspace.is_live(name) {
            tracing::debug!(ifname = name, "using userspace transport");
            return &self.userspace;
        }
        match &self.kernel {
            Some(kernel) => {
                tracing::debug!(ifname = name, "using kernel transport");
                kernel.as_ref()
            }
            None => &self.userspace,
        }
    }
}

#[cfg(target_os = "linux")]
fn platform_kernel(config: &IpcConfig) -> Option<Box<dyn ConfigTransport>> {
    let transport = match config.get_message_capacity() {
        Some(capacity) => crate::netlink::NetlinkTransport::with_message_capacity(capacity),
        None => crate::netlink::NetlinkTransport::new(),
    };
    Some(Box::new(transport))
}

#[cfg(target_os = "openbsd")]
fn platform_kernel(_config: &IpcConfig) -> Option<Box<dyn ConfigTransport>> {
    Some(Box::new(crate::ioctl::IoctlTransport::new()))
}

#[cfg(not(any(target_os = "linux", target_os = "openbsd")))]
fn platform_kernel(_config: &IpcConfig) -> Option<Box<dyn ConfigTransport>> {
    None
}
