//! Run a command inside the guest and collect its output.
//!
//! The command runs under `cmd.exe` or `/bin/sh` with stdout and stderr
//! redirected to a temp file. When waiting, the process is polled once a
//! second until it ends; the temp file is then fetched through a transfer URL
//! and removed.

use crate::error::{GuestError, GuestResult};
use crate::guest::GuestApi;
use crate::shell;
use crate::transfer::TransferClient;
use crate::types::*;

use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const WINDOWS_SHELL: &str = r"C:\Windows\System32\cmd.exe";
const WINDOWS_TEMP: &str = r"C:\Windows\Temp\";
const POSIX_SHELL: &str = "/bin/sh";
const POSIX_TEMP: &str = "/tmp/";

/// Where the redirected output lands inside the guest.
pub fn temp_output_path(family: GuestFamily, n: u64) -> String {
    let dir = match family {
        GuestFamily::Windows => WINDOWS_TEMP,
        GuestFamily::Posix => POSIX_TEMP,
    };
    format!("{dir}guest-cli-{n}.log")
}

/// Build the program spec that runs `req.command` with output redirected to `output_file`.
pub fn build_program_spec(
    family: GuestFamily,
    req: &ExecRequest,
    auth: &GuestAuth,
    output_file: &str,
) -> GuestResult<GuestProgramSpec> {
    let (program_path, arguments) = match family {
        GuestFamily::Windows => {
            if req.sudo {
                return Err(GuestError::unsupported("--sudo flag is not supported on Windows"));
            }
            (
                WINDOWS_SHELL.to_string(),
                format!("/C \"{} > {output_file} 2>&1\"", req.command),
            )
        }
        GuestFamily::Posix => {
            let command = if req.sudo {
                format!(
                    "echo {} | sudo -S -p '' sh -c {}",
                    shell::quote(&auth.password),
                    shell::quote(&req.command)
                )
            } else {
                req.command.clone()
            };
            (
                POSIX_SHELL.to_string(),
                format!("-c {}", shell::quote(&format!("{command} > {output_file} 2>&1"))),
            )
        }
    };

    Ok(GuestProgramSpec {
        program_path,
        arguments,
        working_directory: req.working_directory.clone().filter(|d| !d.is_empty()),
    })
}

/// Poll `pid` every [`POLL_INTERVAL`] until it ends; returns its exit code.
///
/// A pid the guest no longer knows counts as finished with code 0.
pub async fn wait_for_exit(
    guest: &dyn GuestApi,
    pid: i64,
    cancel: &CancellationToken,
) -> GuestResult<i32> {
    let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GuestError::cancelled(format!("wait for pid {pid} cancelled")));
            }
            _ = ticker.tick() => {}
        }

        match guest.list_process(pid).await? {
            None => {
                debug!("pid {pid} no longer listed, treating as exited");
                return Ok(0);
            }
            Some(proc_info) if proc_info.is_finished() => {
                return Ok(proc_info.exit_code.unwrap_or(0));
            }
            Some(_) => debug!("pid {pid} still running"),
        }
    }
}

/// Resolve the guest family; a failed lookup falls back to POSIX.
async fn detect_family(guest: &dyn GuestApi) -> GuestFamily {
    match guest.guest_family().await {
        Ok(reported) => GuestFamily::from_reported(reported.as_deref().unwrap_or_default()),
        Err(e) => {
            warn!("Failed to fetch guest properties: {e}. Assuming Linux.");
            GuestFamily::Posix
        }
    }
}

/// Start the command and, if `req.wait`, wait for it and fetch its output.
pub async fn execute(
    guest: &dyn GuestApi,
    http: &TransferClient,
    req: &ExecRequest,
    cancel: &CancellationToken,
) -> GuestResult<ExecOutcome> {
    if req.command.trim().is_empty() {
        return Err(GuestError::missing_input("--cmd flag is required"));
    }
    let family = detect_family(guest).await;
    let output_file = temp_output_path(family, rand::random::<u32>() as u64);
    let spec = build_program_spec(family, req, guest.auth(), &output_file)?;
    if req.sudo {
        debug!("Executing: {} <sudo pipeline, {} bytes>", spec.program_path, spec.arguments.len());
    } else {
        debug!("Executing: {} {}", spec.program_path, spec.arguments);
    }

    let pid = guest.start_program(&spec).await?;
    info!("Process started with PID: {pid}");

    if !req.wait {
        return Ok(ExecOutcome::Started { pid, output_file });
    }

    let exit_code = wait_for_exit(guest, pid, cancel).await?;
    debug!("pid {pid} exited with code {exit_code}");

    let transfer = guest
        .initiate_transfer_from_guest(&output_file)
        .await
        .map_err(|e| e.context("failed to retrieve command output"))?;
    let output = http
        .fetch_bytes(&transfer.url)
        .await
        .map_err(|e| e.context("failed to retrieve command output"))?;

    if let Err(e) = guest.delete_file(&output_file).await {
        warn!("Could not remove {output_file}: {e}");
    }

    Ok(ExecOutcome::Finished { pid, exit_code, output })
}
