//! `list` command

use super::args::ConnectionArgs;
use guest_vsphere::{GuestResult, VmListEntry};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const UNKNOWN: &str = "<unknown>";
const PADDING: usize = 2;

pub async fn run(conn: &ConnectionArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let mut service = super::connect(conn).await?;
    let result = super::until_cancelled(cancel, service.list_vms()).await;
    service.disconnect().await;

    let vms = result?;
    debug!("Found {} VMs.", vms.len());
    print!("{}", render_table(&vms));
    Ok(())
}

/// Space-aligned table; the last column is not padded.
pub fn render_table(vms: &[VmListEntry]) -> String {
    let mut rows: Vec<[&str; 4]> = vec![["NAME", "STATUS", "IP ADDRESS", "OS FAMILY"]];
    rows.extend(vms.iter().map(|vm| {
        [
            vm.name.as_str(),
            vm.overall_status.as_str(),
            vm.ip_address.as_deref().filter(|s| !s.is_empty()).unwrap_or(UNKNOWN),
            vm.guest_family.as_deref().filter(|s| !s.is_empty()).unwrap_or(UNKNOWN),
        ]
    }));

    let mut widths = [0usize; 3];
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in &rows {
        for (cell, w) in row.iter().zip(widths.iter()) {
            out.push_str(cell);
            out.extend(std::iter::repeat(' ').take(w - cell.chars().count() + PADDING));
        }
        out.push_str(row[3]);
        out.push('\n');
    }
    out
}
