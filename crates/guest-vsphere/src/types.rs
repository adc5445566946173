//! Shared types for vSphere guest operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection / Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parameters for connecting to a vCenter / ESXi host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VsphereConfig {
    /// Endpoint: "vcsa.lab.local", "10.0.0.5:8443" or "https://vcsa.lab.local/sdk"
    pub host: String,
    /// Username (e.g. "administrator@vsphere.local")
    pub username: String,
    /// Password
    #[serde(skip_serializing)]
    pub password: String,
    /// Skip TLS certificate verification (self-signed labs)
    #[serde(default)]
    pub insecure: bool,
    /// Datacenter used to resolve relative inventory paths
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 { 60 }

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            insecure: false,
            datacenter: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// In-guest account used by the guest operations managers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAuth {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl GuestAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Managed objects
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// vim25 managed object reference (`<_this type="VirtualMachine">vm-42</_this>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self { kind: kind.into(), value: value.into() }
    }
}

impl std::fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// The subset of `ServiceContent` this crate talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ManagedObjectRef,
    pub property_collector: ManagedObjectRef,
    pub view_manager: Option<ManagedObjectRef>,
    pub session_manager: Option<ManagedObjectRef>,
    pub search_index: Option<ManagedObjectRef>,
    pub guest_operations_manager: Option<ManagedObjectRef>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VM listing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One row of the `list` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmListEntry {
    pub name: String,
    /// `summary.overallStatus` (gray / green / yellow / red)
    pub overall_status: String,
    pub ip_address: Option<String>,
    pub guest_family: Option<String>,
}

/// Guest OS family as reported by VMware Tools (`guest.guestFamily`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuestFamily {
    Windows,
    Posix,
}

impl GuestFamily {
    /// Anything mentioning "windows" is Windows; everything else (linuxGuest,
    /// solarisGuest, darwinGuestFamily, empty) is driven through `/bin/sh`.
    pub fn from_reported(family: &str) -> Self {
        if family.to_ascii_lowercase().contains("windows") {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Guest processes / files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GuestProgramSpec` passed to `StartProgramInGuest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestProgramSpec {
    pub program_path: String,
    pub arguments: String,
    #[serde(default)]
    pub working_directory: Option<String>,
}

/// `GuestProcessInfo` returned by `ListProcessesInGuest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestProcessInfo {
    pub pid: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub cmd_line: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Unset while the process is running.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Only meaningful once `end_time` is set.
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl GuestProcessInfo {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// `FileTransferInformation` returned by `InitiateFileTransferFromGuest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferInfo {
    /// Single-use URL valid for one GET.
    pub url: String,
    pub size: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Exec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the `exec` command asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Wrap the command in `sudo -S` (POSIX guests only).
    #[serde(default)]
    pub sudo: bool,
    /// Poll until the process ends and fetch its output.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool { true }

/// Result of a finished (or detached) guest command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecOutcome {
    /// `wait = false`: the program was started and left running.
    Started { pid: i64, output_file: String },
    /// The program ended; `output` is the captured stdout + stderr.
    Finished { pid: i64, exit_code: i32, output: Vec<u8> },
}

impl ExecOutcome {
    /// Relay a non-zero guest exit code as this invocation's failure.
    pub fn check(&self) -> crate::error::GuestResult<()> {
        match self {
            Self::Finished { exit_code, .. } if *exit_code != 0 => {
                Err(crate::error::GuestError::remote_exit(*exit_code))
            }
            _ => Ok(()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Console keyboard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One keystroke: USB HID usage id on the keyboard page plus shift state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    pub usage: u16,
    pub shift: bool,
}

impl KeyEvent {
    /// `UsbScanCodeSpecKeyEvent.usbHidCode`: usage in the high half, `0x0007` low.
    pub fn usb_hid_code(&self) -> i32 {
        ((self.usage as i32) << 16) | 0x0007
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_family_detection() {
        assert_eq!(GuestFamily::from_reported("windowsGuest"), GuestFamily::Windows);
        assert_eq!(GuestFamily::from_reported("WINDOWSGUEST"), GuestFamily::Windows);
        assert_eq!(GuestFamily::from_reported("linuxGuest"), GuestFamily::Posix);
        assert_eq!(GuestFamily::from_reported(""), GuestFamily::Posix);
    }

    #[test]
    fn test_usb_hid_code_packing() {
        let ev = KeyEvent { usage: 0x04, shift: false };
        assert_eq!(ev.usb_hid_code(), 0x0004_0007);
        let enter = KeyEvent { usage: 0x28, shift: false };
        assert_eq!(enter.usb_hid_code(), 0x0028_0007);
    }

    #[test]
    fn test_exec_outcome_check() {
        let ok = ExecOutcome::Finished { pid: 1, exit_code: 0, output: b"hi".to_vec() };
        assert!(ok.check().is_ok());
        let failed = ExecOutcome::Finished { pid: 1, exit_code: 7, output: Vec::new() };
        assert_eq!(failed.check().unwrap_err().remote_exit_code(), Some(7));
        let started = ExecOutcome::Started { pid: 9, output_file: "/tmp/x".into() };
        assert!(started.check().is_ok());
    }

    #[test]
    fn test_config_password_not_serialized() {
        let cfg = VsphereConfig {
            host: "vcsa".into(),
            username: "admin".into(),
            password: "secret".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("timeoutSecs"));
    }
}
