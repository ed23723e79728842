//! Show command implementation for WireGuard.

use clap::{Args, ValueEnum};
use wg_ipc::{Device, Peer, Result, WgApi};

use crate::output::{base64_encode, format_bytes, format_time_ago};

#[derive(Args)]
pub struct ShowArgs {
    /// Interface name (shows all if omitted)
    pub interface: Option<String>,

    /// Show only specific field
    #[arg(value_enum)]
    pub field: Option<ShowField>,
}

#[derive(Clone, ValueEnum)]
pub enum ShowField {
    /// Show public key
    PublicKey,
    /// Show private key
    PrivateKey,
    /// Show listen port
    ListenPort,
    /// Show firewall mark
    Fwmark,
    /// Show peer public keys
    Peers,
    /// Show preshared keys
    PresharedKeys,
    /// Show peer endpoints
    Endpoints,
    /// Show allowed IPs
    AllowedIps,
    /// Show latest handshake times
    LatestHandshakes,
    /// Show transfer statistics
    Transfer,
    /// Show persistent keepalive intervals
    PersistentKeepalive,
    /// Machine-readable dump format
    Dump,
}

/// Print the names of all WireGuard interfaces.
pub fn run_interfaces(api: &WgApi) -> Result<()> {
    let names = api.list_interfaces()?;
    println!("{}", names.iter().collect::<Vec<_>>().join(" "));
    Ok(())
}

/// Run show for all WireGuard interfaces.
pub fn run_all(api: &WgApi) -> Result<()> {
    let names = api.list_interfaces()?;

    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            println!();
        }
        match api.get_device(name) {
            Ok(device) => print_device(&device),
            Err(e) => {
                tracing::warn!(ifname = name, error = %e, "unable to read interface");
                eprintln!("Unable to access interface {}: {}", name, e);
            }
        }
    }
    Ok(())
}

/// Run show command with arguments.
pub fn run(api: &WgApi, args: ShowArgs) -> Result<()> {
    let Some(interface) = args.interface else {
        return run_all(api);
    };
    let device = api.get_device(&interface)?;

    let Some(field) = args.field else {
        print_device(&device);
        return Ok(());
    };

    match field {
        ShowField::PublicKey => println!("{}", key_or_none(device.get_public_key())),
        ShowField::PrivateKey => println!("{}", key_or_none(device.get_private_key())),
        ShowField::ListenPort => println!("{}", device.listen_port.unwrap_or(0)),
        ShowField::Fwmark => println!("{}", fwmark(&device)),
        ShowField::Peers => {
            for peer in &device.peers {
                println!("{}", base64_encode(&peer.public_key));
            }
        }
        ShowField::PresharedKeys => per_peer(&device, |p| key_or_none(p.preshared_key.as_ref())),
        ShowField::Endpoints => per_peer(&device, endpoint),
        ShowField::AllowedIps => per_peer(&device, |p| allowed_ips(p, " ")),
        ShowField::LatestHandshakes => per_peer(&device, |p| p.last_handshake.sec.to_string()),
        ShowField::Transfer => per_peer(&device, |p| format!("{}\t{}", p.rx_bytes, p.tx_bytes)),
        ShowField::PersistentKeepalive => per_peer(&device, keepalive),
        ShowField::Dump => print_dump(&device),
    }
    Ok(())
}

/// Run showconf command - output in wg-quick format.
pub fn run_conf(api: &WgApi, interface: &str) -> Result<()> {
    let device = api.get_device(interface)?;

    println!("[Interface]");
    if let Some(port) = device.listen_port.filter(|&p| p != 0) {
        println!("ListenPort = {}", port);
    }
    if let Some(mark) = device.fwmark.filter(|&m| m != 0) {
        println!("FwMark = 0x{:x}", mark);
    }
    if let Some(key) = device.get_private_key() {
        println!("PrivateKey = {}", base64_encode(key));
    }

    for peer in &device.peers {
        println!();
        println!("[Peer]");
        println!("PublicKey = {}", base64_encode(&peer.public_key));
        if let Some(psk) = &peer.preshared_key {
            println!("PresharedKey = {}", base64_encode(psk));
        }
        if !peer.allowed_ips.is_empty() {
            println!("AllowedIPs = {}", allowed_ips(peer, ", "));
        }
        if let Some(endpoint) = &peer.endpoint {
            println!("Endpoint = {}", endpoint);
        }
        if let Some(interval) = peer.persistent_keepalive.filter(|&k| k > 0) {
            println!("PersistentKeepalive = {}", interval);
        }
    }
    Ok(())
}

fn per_peer(device: &Device, value: impl Fn(&Peer) -> String) {
    for peer in &device.peers {
        println!("{}\t{}", base64_encode(&peer.public_key), value(peer));
    }
}

fn key_or_none(key: Option<&wg_ipc::Key>) -> String {
    key.map(|k| base64_encode(k))
        .unwrap_or_else(|| "(none)".to_string())
}

fn fwmark(device: &Device) -> String {
    device
        .fwmark
        .filter(|&m| m != 0)
        .map(|m| format!("0x{:x}", m))
        .unwrap_or_else(|| "off".to_string())
}

fn endpoint(peer: &Peer) -> String {
    peer.endpoint
        .map(|e| e.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

fn allowed_ips(peer: &Peer, sep: &str) -> String {
    if peer.allowed_ips.is_empty() {
        return "(none)".to_string();
    }
    peer.allowed_ips
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn keepalive(peer: &Peer) -> String {
    peer.persistent_keepalive
        .filter(|&k| k > 0)
        .map(|k| k.to_string())
        .unwrap_or_else(|| "off".to_string())
}

/// Print device information in human-readable format.
fn print_device(device: &Device) {
    println!("interface: {}", device.name);

    if let Some(key) = device.get_public_key() {
        println!("  public key: {}", base64_encode(key));
    }
    if device.get_private_key().is_some() {
        println!("  private key: (hidden)");
    }
    if let Some(port) = device.listen_port.filter(|&p| p != 0) {
        println!("  listening port: {}", port);
    }
    if device.fwmark.is_some_and(|m| m != 0) {
        println!("  fwmark: {}", fwmark(device));
    }

    for peer in &device.peers {
        println!();
        print_peer(peer);
    }
}

/// Print peer information.
fn print_peer(peer: &Peer) {
    println!("peer: {}", base64_encode(&peer.public_key));

    if peer.preshared_key.is_some() {
        println!("  preshared key: (hidden)");
    }
    if let Some(endpoint) = &peer.endpoint {
        println!("  endpoint: {}", endpoint);
    }
    println!("  allowed ips: {}", allowed_ips(peer, ", "));
    if let Some(time) = peer.last_handshake() {
        println!("  latest handshake: {}", format_time_ago(time));
    }
    if peer.rx_bytes > 0 || peer.tx_bytes > 0 {
        println!(
            "  transfer: {} received, {} sent",
            format_bytes(peer.rx_bytes),
            format_bytes(peer.tx_bytes)
        );
    }
    if let Some(interval) = peer.persistent_keepalive.filter(|&k| k > 0) {
        println!("  persistent keepalive: every {} seconds", interval);
    }
}

/// Print device in machine-readable dump format.
fn print_dump(device: &Device) {
    println!(
        "{}\t{}\t{}\t{}",
        key_or_none(device.get_private_key()),
        key_or_none(device.get_public_key()),
        device.listen_port.unwrap_or(0),
        fwmark(device)
    );

    for peer in &device.peers {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            base64_encode(&peer.public_key),
            key_or_none(peer.preshared_key.as_ref()),
            endpoint(peer),
            allowed_ips(peer, ","),
            peer.last_handshake.sec,
            peer.rx_bytes,
            peer.tx_bytes,
            keepalive(peer)
        );
    }
}
