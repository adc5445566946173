//! Aggregate service façade for the guest operations crate.
//!
//! `GuestService` owns the `VsphereClient` for one invocation and exposes
//! every operation the CLI needs, resolving VMs by name on the way in.

use crate::error::{GuestError, GuestResult};
use crate::exec;
use crate::guest::VsphereGuest;
use crate::transfer::{self, TransferClient};
use crate::types::*;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;

use log::debug;
use std::path::Path;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Top-level service over one vSphere session.
pub struct GuestService {
    client: Option<VsphereClient>,
}

impl Default for GuestService {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestService {
    /// Create a new (disconnected) service.
    pub fn new() -> Self {
        Self { client: None }
    }

    /// Whether we have an active vSphere session.
    pub fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    fn require_client(&self) -> GuestResult<&VsphereClient> {
        self.client
            .as_ref()
            .filter(|c| c.is_connected())
            .ok_or_else(|| GuestError::connection("Not connected to vSphere"))
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Log in and pin the configured datacenter. A half-open session is
    /// logged out again before the error is returned.
    pub async fn connect(&mut self, config: &VsphereConfig) -> GuestResult<()> {
        let mut client = VsphereClient::new(config)?;
        if let Err(e) = client.connect().await {
            client.logout().await;
            return Err(e);
        }
        self.client = Some(client);
        Ok(())
    }

    /// Best-effort logout; never fails.
    pub async fn disconnect(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.logout().await;
            debug!("Session closed");
        }
    }

    // ── Inventory ───────────────────────────────────────────────────

    pub async fn find_vm(&self, name: &str) -> GuestResult<ManagedObjectRef> {
        self.require_client()?
            .find_vm(name)
            .await
            .map_err(|e| e.context(format!("failed to find VM {name}")))
    }

    pub async fn list_vms(&self) -> GuestResult<Vec<VmListEntry>> {
        VmManager::new(self.require_client()?).list_vms().await
    }

    // ── Guest operations ────────────────────────────────────────────

    /// Guest operations handle for the named VM.
    pub async fn guest(&self, vm_name: &str, auth: GuestAuth) -> GuestResult<VsphereGuest<'_>> {
        let client = self.require_client()?;
        let vm = self.find_vm(vm_name).await?;
        VsphereGuest::open(client, vm, auth).await
    }

    /// HTTP client for transfer URLs, honouring the session's TLS setting.
    pub fn transfer_client(&self) -> GuestResult<TransferClient> {
        let client = self.require_client()?;
        TransferClient::new(client.config().insecure, Some(client.soap().endpoint().clone()))
    }

    pub async fn exec(
        &self,
        vm_name: &str,
        auth: GuestAuth,
        req: &ExecRequest,
        cancel: &CancellationToken,
    ) -> GuestResult<ExecOutcome> {
        let guest = self.guest(vm_name, auth).await?;
        exec::execute(&guest, &self.transfer_client()?, req, cancel).await
    }

    pub async fn upload(
        &self,
        vm_name: &str,
        auth: GuestAuth,
        local: &Path,
        remote: &str,
    ) -> GuestResult<u64> {
        let guest = self.guest(vm_name, auth).await?;
        transfer::upload(&guest, &self.transfer_client()?, local, remote).await
    }

    pub async fn download(
        &self,
        vm_name: &str,
        auth: GuestAuth,
        remote: &str,
        local: &Path,
    ) -> GuestResult<u64> {
        let guest = self.guest(vm_name, auth).await?;
        transfer::download(&guest, &self.transfer_client()?, remote, local).await
    }

    pub async fn cat<W>(&self, vm_name: &str, auth: GuestAuth, remote: &str, out: &mut W) -> GuestResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let guest = self.guest(vm_name, auth).await?;
        transfer::cat(&guest, &self.transfer_client()?, remote, out).await
    }

    // ── Console ─────────────────────────────────────────────────────

    /// Send key events to the VM console; returns how many were injected.
    pub async fn send_keys(&self, vm_name: &str, events: &[KeyEvent]) -> GuestResult<i32> {
        let client = self.require_client()?;
        let vm = self.find_vm(vm_name).await?;
        VmManager::new(client).put_usb_scan_codes(&vm, events).await
    }
}
