//! # guest-vsphere – vSphere Guest Operations
//!
//! Drives VMware Tools guest operations through the vSphere Web Services
//! (vim25 SOAP) API: run commands, move files and type into VM consoles.
//!
//! ## Modules
//!
//! - **types**: Shared data structures (config, managed object refs, processes, key events)
//! - **error**: Crate-specific error types
//! - **xml**: Owned element tree over `quick-xml`
//! - **soap**: vim25 envelope / fault handling over HTTP
//! - **vsphere**: Session, inventory lookup, property collector
//! - **vm**: VM listing, guest family, `PutUsbScanCodes`
//! - **guest**: Guest process / file managers behind the `GuestApi` trait
//! - **shell**: POSIX single-quote escaping
//! - **exec**: Run-and-wait command flow with output capture
//! - **keyboard**: Character → USB HID usage table
//! - **transfer**: Upload / download over transfer URLs
//! - **service**: Aggregate facade used by the CLI

pub mod types;
pub mod error;
pub mod xml;
pub mod soap;
pub mod vsphere;
pub mod vm;
pub mod guest;
pub mod shell;
pub mod exec;
pub mod keyboard;
pub mod transfer;
pub mod service;

pub use error::{GuestError, GuestErrorKind, GuestResult};
pub use service::GuestService;
pub use types::*;
