//! `upload` and `download` commands

use super::args::{ConnectionArgs, GuestArgs};
use clap::Args;
use guest_vsphere::GuestResult;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to send
    pub local: PathBuf,
    /// Destination path inside the guest (overwritten if present)
    pub remote: String,

    #[command(flatten)]
    pub guest: GuestArgs,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// File inside the guest
    pub remote: String,
    /// Local destination (created or truncated)
    pub local: PathBuf,

    #[command(flatten)]
    pub guest: GuestArgs,
}

pub async fn upload(conn: &ConnectionArgs, args: &UploadArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let vm = conn.require_vm()?;
    let auth = args.guest.to_auth()?;

    let mut service = super::connect(conn).await?;
    let result = super::until_cancelled(cancel, service.upload(vm, auth, &args.local, &args.remote)).await;
    service.disconnect().await;

    let bytes = result?;
    info!("Uploaded {} bytes to {}", bytes, args.remote);
    Ok(())
}

pub async fn download(conn: &ConnectionArgs, args: &DownloadArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let vm = conn.require_vm()?;
    let auth = args.guest.to_auth()?;

    let mut service = super::connect(conn).await?;
    let result = super::until_cancelled(cancel, service.download(vm, auth, &args.remote, &args.local)).await;
    service.disconnect().await;

    let bytes = result?;
    info!("Downloaded {} bytes to {}", bytes, args.local.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_positional_order() {
        let cli = Cli::try_parse_from(["guest-cli", "upload", "./a.txt", "/tmp/a.txt"]).unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.local.to_str(), Some("./a.txt"));
                assert_eq!(args.remote, "/tmp/a.txt");
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["guest-cli", "download", "/var/log/syslog", "syslog"]).unwrap();
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.remote, "/var/log/syslog");
                assert_eq!(args.local.to_str(), Some("syslog"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
