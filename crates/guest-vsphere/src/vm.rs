//! Virtual machine queries and console input.
//!
//! Covers the inventory listing, the guest family lookup used by `exec`,
//! and keystroke injection through `PutUsbScanCodes`.

use crate::error::{GuestError, GuestResult};
use crate::soap;
use crate::types::*;
use crate::vsphere::{ObjectContent, VsphereClient};

use log::debug;

const LIST_PROPERTIES: [&str; 4] = [
    "name",
    "summary.overallStatus",
    "guest.ipAddress",
    "guest.guestFamily",
];

/// VM operations backed by `VsphereClient`.
pub struct VmManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    // ── List ────────────────────────────────────────────────────────

    /// Every VM below the root folder, in the order the server returns them.
    pub async fn list_vms(&self) -> GuestResult<Vec<VmListEntry>> {
        let root = self.client.content()?.root_folder.clone();
        let objects = self
            .client
            .retrieve_container(&root, "VirtualMachine", &LIST_PROPERTIES)
            .await
            .map_err(|e| e.context("failed to list VMs"))?;
        let vms: Vec<VmListEntry> = objects.iter().map(list_entry).collect();
        debug!("Found {} VMs", vms.len());
        Ok(vms)
    }

    // ── Guest info ──────────────────────────────────────────────────

    /// Raw `guest.guestFamily` (e.g. "linuxGuest"); `None` when Tools has not reported it.
    pub async fn guest_family(&self, vm: &ManagedObjectRef) -> GuestResult<Option<String>> {
        let oc = self
            .client
            .retrieve_object(vm, &["guest.guestFamily"])
            .await?;
        Ok(oc.text("guest.guestFamily").map(str::to_string))
    }

    // ── Console ─────────────────────────────────────────────────────

    /// Inject keystrokes into the VM console; returns how many events were accepted.
    pub async fn put_usb_scan_codes(
        &self,
        vm: &ManagedObjectRef,
        events: &[KeyEvent],
    ) -> GuestResult<i32> {
        let params = format!(
            "{}<spec>{}</spec>",
            soap::moref("_this", vm),
            key_events_xml(events)
        );
        let resp = self
            .client
            .soap()
            .invoke("PutUsbScanCodes", &params)
            .await
            .map_err(|e| e.context("failed to send keystrokes"))?;
        resp.child_text("returnval")
            .map(str::trim)
            .unwrap_or("0")
            .parse::<i32>()
            .map_err(|e| GuestError::parse(format!("Bad PutUsbScanCodes result: {e}")))
    }
}

fn list_entry(oc: &ObjectContent) -> VmListEntry {
    VmListEntry {
        name: oc.text("name").unwrap_or_default().to_string(),
        overall_status: oc.text("summary.overallStatus").unwrap_or("gray").to_string(),
        ip_address: oc.text("guest.ipAddress").map(str::to_string),
        guest_family: oc.text("guest.guestFamily").map(str::to_string),
    }
}

fn key_events_xml(events: &[KeyEvent]) -> String {
    events
        .iter()
        .map(|ev| {
            let modifiers = if ev.shift {
                "<modifiers><leftShift>true</leftShift></modifiers>"
            } else {
                ""
            };
            format!(
                "<keyEvents><usbHidCode>{}</usbHidCode>{modifiers}</keyEvents>",
                ev.usb_hid_code()
            )
        })
        .collect()
}
