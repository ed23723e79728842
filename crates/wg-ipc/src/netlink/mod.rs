//! Linux kernel transport.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ NetlinkTransport (ConfigTransport)      │
//! └──────────┬─────────────────┬────────────┘
//!            │                 │
//! ┌──────────▼───────┐ ┌───────▼────────────┐
//! │ wireguard (GENL) │ │ link (RTNetlink)   │
//! │ get/set device   │ │ list interfaces    │
//! └──────────┬───────┘ └───────┬────────────┘
//!            │                 │
//! ┌──────────▼─────────────────▼────────────┐
//! │ NetlinkSocket (blocking, one per call)  │
//! └─────────────────────────────────────────┘
//! ```

pub mod attr;
pub mod builder;
pub mod genl;
pub mod link;
pub mod message;
pub mod socket;
pub mod wireguard;

pub use builder::{MessageBuilder, NestToken};
pub use socket::{DumpEnd, NetlinkSocket, Protocol};
pub use wireguard::{NetlinkTransport, SetEncoder};
