//! CLI module for guest-cli
//!
//! Commands:
//! - `list`: VMs with status, IP address and OS family
//! - `cat`, `upload`, `download`: guest file transfer
//! - `exec`: run a command in the guest and relay its output
//! - `type`: send keystrokes to the VM console
//! - `screenshot`: placeholder

use clap::{Parser, Subcommand};
use guest_vsphere::{GuestError, GuestResult, GuestService};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub mod args;
pub mod cat;
pub mod exec;
pub mod keys;
pub mod list;
pub mod screenshot;
pub mod transfer;

use args::ConnectionArgs;

/// A CLI for interacting with vSphere guests via VMware Tools
#[derive(Parser, Debug)]
#[command(name = "guest-cli")]
#[command(about = "Run commands, transfer files and type into vSphere guests via VMware Tools")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List virtual machines
    List,
    /// Print a guest file to stdout
    Cat(cat::CatArgs),
    /// Copy a local file into the guest
    Upload(transfer::UploadArgs),
    /// Copy a guest file to the local machine
    Download(transfer::DownloadArgs),
    /// Execute a command inside the guest
    Exec(exec::ExecArgs),
    /// Type text into the VM console
    Type(keys::TypeArgs),
    /// Capture the VM console (disabled)
    Screenshot(screenshot::ScreenshotArgs),
}

/// Run the CLI command
pub async fn run(cli: Cli, cancel: CancellationToken) -> GuestResult<()> {
    let conn = &cli.connection;
    match &cli.command {
        Commands::List => list::run(conn, &cancel).await,
        Commands::Cat(args) => cat::run(conn, args, &cancel).await,
        Commands::Upload(args) => transfer::upload(conn, args, &cancel).await,
        Commands::Download(args) => transfer::download(conn, args, &cancel).await,
        Commands::Exec(args) => exec::run(conn, args, &cancel).await,
        Commands::Type(args) => keys::run(conn, args, &cancel).await,
        Commands::Screenshot(args) => screenshot::run(args),
    }
}

// ── Session helpers ──────────────────────────────────────────────────────────

/// Build the config from flags and open a session.
pub(crate) async fn connect(conn: &ConnectionArgs) -> GuestResult<GuestService> {
    let config = conn.to_config()?;
    let mut service = GuestService::new();
    service.connect(&config).await?;
    Ok(service)
}

/// Drive `work` unless Ctrl-C fires first.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = GuestResult<T>>,
) -> GuestResult<T> {
    tokio::select! {
        res = work => res,
        _ = cancel.cancelled() => Err(GuestError::cancelled("interrupted")),
    }
}
