//! Set command implementation for WireGuard.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use wg_ipc::userspace::parse::parse_allowed_ip;
use wg_ipc::{AllowedIp, Device, Error, Key, Peer, Result, WgApi};

use crate::output::parse_key;

#[derive(Args)]
pub struct SetArgs {
    /// Interface name
    pub interface: String,

    /// Listen port
    #[arg(long = "listen-port")]
    pub listen_port: Option<u16>,

    /// Private key file path
    #[arg(long = "private-key")]
    pub private_key: Option<PathBuf>,

    /// Firewall mark
    #[arg(long)]
    pub fwmark: Option<u32>,

    /// Replace all existing peers
    #[arg(long = "replace-peers")]
    pub replace_peers: bool,

    /// Peer public key (base64)
    #[arg(long, value_parser = parse_key)]
    pub peer: Option<Key>,

    /// Remove the peer
    #[arg(long, requires = "peer")]
    pub remove: bool,

    /// Peer endpoint (IP:port)
    #[arg(long, requires = "peer")]
    pub endpoint: Option<SocketAddr>,

    /// Peer allowed IPs (comma-separated CIDR notation), replacing the current ones
    #[arg(long = "allowed-ips", requires = "peer", value_delimiter = ',', value_parser = parse_allowed_ip_arg)]
    pub allowed_ips: Option<Vec<AllowedIp>>,

    /// Persistent keepalive interval in seconds
    #[arg(long = "persistent-keepalive", requires = "peer")]
    pub persistent_keepalive: Option<u16>,

    /// Preshared key file path
    #[arg(long = "preshared-key", requires = "peer")]
    pub preshared_key: Option<PathBuf>,
}

/// Run the set command.
pub fn run(api: &WgApi, args: SetArgs) -> Result<()> {
    let device = build_device(args)?;
    tracing::debug!(ifname = %device.name, peers = device.peers.len(), "applying configuration");
    api.set_device(&device)
}

fn build_device(args: SetArgs) -> Result<Device> {
    let mut device = Device::new(args.interface);
    device.listen_port = args.listen_port;
    device.fwmark = args.fwmark;
    device.replace_peers = args.replace_peers;
    if let Some(path) = &args.private_key {
        device.set_private_key(Some(read_key_file(path)?));
    }

    let Some(public_key) = args.peer else {
        return Ok(device);
    };

    let mut peer = Peer::new(public_key);
    if args.remove {
        device.peers.push(peer.remove());
        return Ok(device);
    }

    if let Some(path) = &args.preshared_key {
        peer = peer.preshared_key(read_key_file(path)?);
    }
    peer.endpoint = args.endpoint;
    peer.persistent_keepalive = args.persistent_keepalive;
    if let Some(ips) = args.allowed_ips {
        peer = peer.allowed_ips(ips).replace_allowed_ips();
    }
    device.peers.push(peer);
    Ok(device)
}

/// Read a base64 key from a file.
fn read_key_file(path: &Path) -> Result<Key> {
    let content = fs::read_to_string(path)?;
    parse_key(&content).map_err(|msg| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), msg),
        ))
    })
}

fn parse_allowed_ip_arg(s: &str) -> std::result::Result<AllowedIp, String> {
    parse_allowed_ip(s.trim()).map_err(|e| e.to_string())
}
