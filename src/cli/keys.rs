//! `type` command

use super::args::ConnectionArgs;
use clap::Args;
use guest_vsphere::keyboard;
use guest_vsphere::GuestResult;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct TypeArgs {
    /// Text to type (a-z, A-Z, space and newline)
    pub text: String,

    /// Append Enter key after text
    #[arg(long)]
    pub enter: bool,
}

impl TypeArgs {
    fn text_to_send(&self) -> String {
        if self.enter {
            format!("{}\n", self.text)
        } else {
            self.text.clone()
        }
    }
}

pub async fn run(conn: &ConnectionArgs, args: &TypeArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let vm = conn.require_vm()?;

    let events = keyboard::encode(&args.text_to_send());
    if events.is_empty() {
        println!("No valid characters to send.");
        return Ok(());
    }

    let mut service = super::connect(conn).await?;
    let result = super::until_cancelled(cancel, service.send_keys(vm, &events)).await;
    service.disconnect().await;

    let injected = result?;
    info!("Sent {} keystrokes to {vm} ({injected} injected)", events.len());
    Ok(())
}
