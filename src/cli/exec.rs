//! `exec` command

use super::args::{ConnectionArgs, GuestArgs};
use clap::{ArgAction, Args};
use guest_vsphere::{ExecOutcome, ExecRequest, GuestError, GuestResult};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command to execute
    #[arg(long)]
    pub cmd: Option<String>,

    /// Wait for the command to finish and capture its output (`--wait=false` to detach)
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        require_equals = true
    )]
    pub wait: bool,

    /// Run the command as root through sudo (POSIX guests only)
    #[arg(long)]
    pub sudo: bool,

    /// Working directory in the guest
    #[arg(long)]
    pub workdir: Option<String>,

    #[command(flatten)]
    pub guest: GuestArgs,
}

impl ExecArgs {
    fn to_request(&self) -> GuestResult<ExecRequest> {
        let command = self
            .cmd
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GuestError::missing_input("--cmd flag is required"))?;
        Ok(ExecRequest {
            command: command.to_string(),
            working_directory: self.workdir.clone().filter(|d| !d.is_empty()),
            sudo: self.sudo,
            wait: self.wait,
        })
    }
}

pub async fn run(conn: &ConnectionArgs, args: &ExecArgs, cancel: &CancellationToken) -> GuestResult<()> {
    let vm = conn.require_vm()?;
    let req = args.to_request()?;
    let auth = args.guest.to_auth()?;

    let mut service = super::connect(conn).await?;
    let result = super::until_cancelled(cancel, service.exec(vm, auth, &req, cancel)).await;
    service.disconnect().await;

    let outcome = result?;
    match &outcome {
        ExecOutcome::Started { pid, output_file } => {
            println!("Process started with PID: {pid} (output: {output_file})");
        }
        ExecOutcome::Finished { output, .. } => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(output).await?;
            stdout.flush().await?;
        }
    }
    outcome.check()
}

#[cfg(test)]
mod tests {
    use super::super::{Cli, Commands};
    use super::*;
    use clap::Parser;
    use guest_vsphere::GuestErrorKind;

    fn parse(extra: &[&str]) -> ExecArgs {
        let mut argv = vec!["guest-cli", "exec"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Exec(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wait_defaults_to_true() {
        assert!(parse(&["--cmd", "ls"]).wait);
        assert!(parse(&["--cmd", "ls", "--wait"]).wait);
        assert!(!parse(&["--cmd", "ls", "--wait=false"]).wait);
    }

    #[test]
    fn test_to_request() {
        let args = parse(&["--cmd", "id -u", "--sudo", "--workdir", "/srv"]);
        let req = args.to_request().unwrap();
        assert_eq!(req.command, "id -u");
        assert!(req.sudo);
        assert!(req.wait);
        assert_eq!(req.working_directory.as_deref(), Some("/srv"));
    }

    #[test]
    fn test_missing_cmd() {
        let err = parse(&[]).to_request().unwrap_err();
        assert_eq!(err.kind, GuestErrorKind::MissingInput);
        assert_eq!(err.to_string(), "--cmd flag is required");
    }
}
