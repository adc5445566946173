//! Flag groups shared by several commands, and their conversion into
//! library configuration.

use clap::Args;
use guest_vsphere::{GuestAuth, GuestError, GuestResult, VsphereConfig};

/// Global connection flags; each falls back to a `VSPHERE_*` variable.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// vSphere host (e.g. vcsa.example.com or https://vcsa.example.com/sdk)
    #[arg(long, env = "VSPHERE_HOST", global = true)]
    pub host: Option<String>,

    /// vSphere username
    #[arg(long, env = "VSPHERE_USER", global = true)]
    pub user: Option<String>,

    /// vSphere password
    #[arg(long, env = "VSPHERE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "VSPHERE_INSECURE", global = true)]
    pub insecure: bool,

    /// Datacenter used to resolve VM names
    #[arg(long, env = "VSPHERE_DATACENTER", global = true)]
    pub datacenter: Option<String>,

    /// Target virtual machine (name or inventory path)
    #[arg(long, global = true)]
    pub vm: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ConnectionArgs {
    pub fn to_config(&self) -> GuestResult<VsphereConfig> {
        match (non_empty(&self.host), non_empty(&self.user), self.password.as_deref()) {
            (Some(host), Some(user), Some(password)) if !password.is_empty() => Ok(VsphereConfig {
                host: host.to_string(),
                username: user.to_string(),
                password: password.to_string(),
                insecure: self.insecure,
                datacenter: non_empty(&self.datacenter).map(str::to_string),
                ..Default::default()
            }),
            _ => Err(GuestError::missing_input(
                "host, user, and password are required (via flags or environment variables)",
            )),
        }
    }

    pub fn require_vm(&self) -> GuestResult<&str> {
        non_empty(&self.vm).ok_or_else(|| GuestError::missing_input("--vm flag is required"))
    }
}

/// In-guest credentials for the guest operations managers.
#[derive(Args, Debug, Clone, Default)]
pub struct GuestArgs {
    /// Guest OS username
    #[arg(long = "guest-user", env = "GUEST_USER")]
    pub guest_user: Option<String>,

    /// Guest OS password
    #[arg(long = "guest-password", env = "GUEST_PASSWORD", hide_env_values = true)]
    pub guest_password: Option<String>,
}

impl GuestArgs {
    pub fn to_auth(&self) -> GuestResult<GuestAuth> {
        match (non_empty(&self.guest_user), self.guest_password.as_deref()) {
            (Some(user), Some(password)) if !password.is_empty() => Ok(GuestAuth::new(user, password)),
            _ => Err(GuestError::missing_input(
                "--guest-user and --guest-password (or GUEST_USER/GUEST_PASSWORD env vars) are required",
            )),
        }
    }
}
