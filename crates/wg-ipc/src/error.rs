//! Error types for configuration transport operations.
//!
//! Every variant maps onto exactly one errno value through [`Error::errno`],
//! so callers that only care about the numeric code (the way `wg(8)` reports
//! failures) never have to inspect the variant.

use std::io;

/// Result type for configuration transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a WireGuard backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket or filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The kernel or a userspace daemon returned an error code.
    #[error("{message} (errno {errno})")]
    Kernel {
        /// The (positive) errno value.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// The peer on the other side of the transport broke the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Interface name cannot be used to address a device.
    #[error("invalid interface name: {0}")]
    InvalidName(String),

    /// Generic netlink family is not registered (module not loaded).
    #[error("generic netlink family not found: {name}")]
    FamilyNotFound {
        /// The family name that was looked up.
        name: String,
    },

    /// An endpoint received over the control socket did not resolve.
    #[error("cannot resolve endpoint {endpoint}")]
    Unresolved {
        /// The endpoint text as received.
        endpoint: String,
    },

    /// Allocation failed while accumulating results.
    #[error("out of memory")]
    OutOfMemory,

    /// A single netlink element does not fit in an empty message.
    #[error("attribute does not fit in a {capacity} byte message")]
    MessageTooLarge {
        /// Message capacity in bytes.
        capacity: usize,
    },
}

impl Error {
    /// Create a kernel error from an errno value.
    ///
    /// Netlink reports errors as negative values, the control-socket protocol
    /// as positive ones; both are accepted.
    pub fn from_errno(errno: i32) -> Self {
        let errno = i32::try_from(errno.unsigned_abs()).unwrap_or(i32::MAX);
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Create a protocol violation error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// The errno value this error stands for.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::Kernel { errno, .. } => *errno,
            Self::Protocol(_) | Self::Truncated { .. } => libc::EPROTO,
            Self::InvalidName(_) => libc::EINVAL,
            Self::FamilyNotFound { .. } => libc::EPROTONOSUPPORT,
            Self::Unresolved { .. } => libc::ENETUNREACH,
            Self::OutOfMemory => libc::ENOMEM,
            Self::MessageTooLarge { .. } => libc::EMSGSIZE,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        matches!(self.errno(), libc::ENOENT | libc::ENODEV)
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), libc::EPERM | libc::EACCES)
    }

    /// Check if a system call was interrupted (EINTR).
    pub fn is_interrupted(&self) -> bool {
        self.errno() == libc::EINTR
    }

    /// Check if this is a protocol violation (EPROTO).
    pub fn is_protocol(&self) -> bool {
        self.errno() == libc::EPROTO
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::from_raw_os_error(other.errno()),
        }
    }
}
