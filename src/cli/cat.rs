//! `cat` command

use super::args::{ConnectionArgs, GuestArgs};
use clap::Args;
use guest_vsphere::GuestResult;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Path of the file inside the guest
    pub remote_file: String,

    #[command(flatten)]
    pub guest: GuestArgs,
}

pub async fn run(conn: &ConnectionArgs, args: &CatArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let vm = conn.require_vm()?;
    let auth = args.guest.to_auth()?;

    let mut service = super::connect(conn).await?;
    let mut stdout = tokio::io::stdout();
    let result = super::until_cancelled(
        cancel,
        service.cat(vm, auth, &args.remote_file, &mut stdout),
    )
    .await;
    service.disconnect().await;
    result.map(|_| ())
}
