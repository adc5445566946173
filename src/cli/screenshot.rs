//! `screenshot` command

use clap::Args;
use guest_vsphere::GuestResult;
use std::path::PathBuf;
use tracing::debug;

#[derive(Args, Debug)]
pub struct ScreenshotArgs {
    /// Output file path
    #[arg(long, default_value = "screenshot.png")]
    pub out: PathBuf,
}

pub fn run(args: &ScreenshotArgs) -> GuestResult<()> {
    debug!("screenshot requested for {}", args.out.display());
    println!("Screenshot functionality is currently disabled in this version.");
    Ok(())
}
