//! wg - WireGuard configuration utility
//!
//! Reads and writes WireGuard interface configuration through whichever
//! backend serves the interface: a userspace daemon's control socket or the
//! kernel.

mod output;
mod set;
mod show;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wg_ipc::config::DEFAULT_SOCKET_DIR;
use wg_ipc::{IpcConfig, Result, WgApi};

#[derive(Parser)]
#[command(name = "wg")]
#[command(about = "WireGuard configuration utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding userspace control sockets
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_DIR)]
    socket_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show WireGuard interfaces and peers
    Show(show::ShowArgs),

    /// Show interface configuration in wg-quick format
    Showconf {
        /// Interface name
        interface: String,
    },

    /// List WireGuard interface names
    Interfaces,

    /// Set interface configuration
    Set(set::SetArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let api = WgApi::with_config(&IpcConfig::new().socket_dir(cli.socket_dir));

    match cli.command {
        None => show::run_all(&api),
        Some(Command::Show(args)) => show::run(&api, args),
        Some(Command::Showconf { interface }) => show::run_conf(&api, &interface),
        Some(Command::Interfaces) => show::run_interfaces(&api),
        Some(Command::Set(args)) => set::run(&api, args),
    }
}
