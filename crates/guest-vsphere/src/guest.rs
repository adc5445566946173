//! Guest operations: processes and files inside a VM, authenticated with
//! in-guest credentials.
//!
//! [`GuestApi`] is the seam the exec and transfer flows are written against;
//! [`VsphereGuest`] implements it on top of the `GuestOperationsManager`'s
//! process and file managers.

use crate::error::{GuestError, GuestErrorKind, GuestResult};
use crate::soap;
use crate::types::*;
use crate::vm::VmManager;
use crate::vsphere::VsphereClient;
use crate::xml::Element;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};

/// Guest-side operations for one VM and one set of guest credentials.
#[async_trait]
pub trait GuestApi: Send + Sync {
    /// Credentials used for every call (also needed to feed `sudo -S`).
    fn auth(&self) -> &GuestAuth;

    /// Raw `guest.guestFamily` as reported by VMware Tools.
    async fn guest_family(&self) -> GuestResult<Option<String>>;

    /// Start a program; returns its pid.
    async fn start_program(&self, spec: &GuestProgramSpec) -> GuestResult<i64>;

    /// Look up one process. `None` when the guest no longer knows the pid.
    async fn list_process(&self, pid: i64) -> GuestResult<Option<GuestProcessInfo>>;

    /// Obtain a single-use download URL for a guest file.
    async fn initiate_transfer_from_guest(&self, path: &str) -> GuestResult<FileTransferInfo>;

    /// Obtain a single-use upload URL for a guest file of `size` bytes.
    async fn initiate_transfer_to_guest(
        &self,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> GuestResult<String>;

    async fn delete_file(&self, path: &str) -> GuestResult<()>;
}

/// [`GuestApi`] backed by a live vSphere session.
pub struct VsphereGuest<'a> {
    client: &'a VsphereClient,
    vm: ManagedObjectRef,
    auth: GuestAuth,
    process_manager: ManagedObjectRef,
    file_manager: ManagedObjectRef,
}

impl<'a> VsphereGuest<'a> {
    /// Resolve the process and file managers for `vm`.
    pub async fn open(
        client: &'a VsphereClient,
        vm: ManagedObjectRef,
        auth: GuestAuth,
    ) -> GuestResult<VsphereGuest<'a>> {
        let gom = client
            .content()?
            .guest_operations_manager
            .clone()
            .ok_or_else(|| GuestError::unsupported("Endpoint exposes no GuestOperationsManager"))?;

        let managers = client
            .retrieve_object(&gom, &["processManager", "fileManager"])
            .await
            .map_err(|e| e.context("failed to resolve guest operations managers"))?;

        let process_manager = managers
            .moref("processManager")
            .ok_or_else(|| GuestError::unsupported("Guest process manager is unavailable"))?;
        let file_manager = managers
            .moref("fileManager")
            .ok_or_else(|| GuestError::unsupported("Guest file manager is unavailable"))?;
        debug!("Guest operations on {vm}: {process_manager}, {file_manager}");

        Ok(Self {
            client,
            vm,
            auth,
            process_manager,
            file_manager,
        })
    }

    /// `_this`, `vm` and `auth` parameters shared by every guest call.
    fn common_params(&self, manager: &ManagedObjectRef) -> String {
        format!(
            concat!(
                "{}{}",
                r#"<auth xsi:type="NamePasswordAuthentication">"#,
                "<interactiveSession>false</interactiveSession>{}{}</auth>"
            ),
            soap::moref("_this", manager),
            soap::moref("vm", &self.vm),
            soap::text("username", &self.auth.username),
            soap::text("password", &self.auth.password),
        )
    }
}

#[async_trait]
impl GuestApi for VsphereGuest<'_> {
    fn auth(&self) -> &GuestAuth {
        &self.auth
    }

    async fn guest_family(&self) -> GuestResult<Option<String>> {
        VmManager::new(self.client).guest_family(&self.vm).await
    }

    async fn start_program(&self, spec: &GuestProgramSpec) -> GuestResult<i64> {
        let params = format!(
            "{}{}",
            self.common_params(&self.process_manager),
            program_spec_xml(spec)
        );
        let resp = self
            .client
            .soap()
            .invoke("StartProgramInGuest", &params)
            .await
            .map_err(|e| e.context("failed to start program"))?;
        let pid = resp
            .child_text("returnval")
            .map(str::trim)
            .unwrap_or_default();
        pid.parse::<i64>()
            .map_err(|e| GuestError::parse(format!("Bad pid '{pid}': {e}")))
    }

    async fn list_process(&self, pid: i64) -> GuestResult<Option<GuestProcessInfo>> {
        let params = format!(
            "{}<pids>{pid}</pids>",
            self.common_params(&self.process_manager)
        );
        let resp = match self.client.soap().invoke("ListProcessesInGuest", &params).await {
            Ok(resp) => resp,
            Err(e) if e.kind == GuestErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.context("failed to list guest processes")),
        };
        let mut found = None;
        for rv in resp.children_named("returnval") {
            let info = parse_process_info(rv)?;
            if info.pid == pid {
                found = Some(info);
                break;
            }
        }
        trace!("pid {pid}: {found:?}");
        Ok(found)
    }

    async fn initiate_transfer_from_guest(&self, path: &str) -> GuestResult<FileTransferInfo> {
        let params = format!(
            "{}{}",
            self.common_params(&self.file_manager),
            soap::text("guestFilePath", path)
        );
        let resp = self
            .client
            .soap()
            .invoke("InitiateFileTransferFromGuest", &params)
            .await
            .map_err(|e| e.context(format!("failed to initiate download of {path}")))?;
        let rv = resp
            .child("returnval")
            .ok_or_else(|| GuestError::parse("InitiateFileTransferFromGuest returned nothing"))?;
        parse_transfer_info(rv)
    }

    async fn initiate_transfer_to_guest(
        &self,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> GuestResult<String> {
        let params = format!(
            r#"{}{}<fileAttributes xsi:type="GuestFileAttributes"></fileAttributes><fileSize>{size}</fileSize><overwrite>{overwrite}</overwrite>"#,
            self.common_params(&self.file_manager),
            soap::text("guestFilePath", path),
        );
        let resp = self
            .client
            .soap()
            .invoke("InitiateFileTransferToGuest", &params)
            .await
            .map_err(|e| e.context(format!("failed to initiate upload to {path}")))?;
        resp.child_text("returnval")
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GuestError::parse("InitiateFileTransferToGuest returned no URL"))
    }

    async fn delete_file(&self, path: &str) -> GuestResult<()> {
        let params = format!(
            "{}{}",
            self.common_params(&self.file_manager),
            soap::text("filePath", path)
        );
        self.client
            .soap()
            .invoke("DeleteFileInGuest", &params)
            .await
            .map_err(|e| e.context(format!("failed to delete {path}")))?;
        Ok(())
    }
}

fn program_spec_xml(spec: &GuestProgramSpec) -> String {
    let workdir = spec
        .working_directory
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(|d| soap::text("workingDirectory", d))
        .unwrap_or_default();
    format!(
        "<spec>{}{}{workdir}</spec>",
        soap::text("programPath", &spec.program_path),
        soap::text("arguments", &spec.arguments),
    )
}

fn parse_time(el: &Element, name: &str) -> GuestResult<Option<DateTime<Utc>>> {
    match el.child_text(name).map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| GuestError::parse(format!("Bad {name} '{raw}': {e}"))),
    }
}

fn parse_process_info(el: &Element) -> GuestResult<GuestProcessInfo> {
    let text = |name: &str| el.child_text(name).unwrap_or_default().trim().to_string();
    let pid_raw = text("pid");
    let pid = pid_raw
        .parse::<i64>()
        .map_err(|e| GuestError::parse(format!("Bad pid '{pid_raw}': {e}")))?;
    let exit_code = match el.child_text("exitCode").map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            code.parse::<i32>()
                .map_err(|e| GuestError::parse(format!("Bad exitCode '{code}': {e}")))?,
        ),
        _ => None,
    };
    Ok(GuestProcessInfo {
        pid,
        name: text("name"),
        owner: text("owner"),
        cmd_line: text("cmdLine"),
        start_time: parse_time(el, "startTime")?,
        end_time: parse_time(el, "endTime")?,
        exit_code,
    })
}

fn parse_transfer_info(el: &Element) -> GuestResult<FileTransferInfo> {
    let url = el
        .child_text("url")
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GuestError::parse("FileTransferInformation has no url"))?
        .to_string();
    let size = el
        .child_text("size")
        .map(str::trim)
        .unwrap_or("0")
        .parse::<u64>()
        .map_err(|e| GuestError::parse(format!("Bad transfer size: {e}")))?;
    Ok(FileTransferInfo { url, size })
}
