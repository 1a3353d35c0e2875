//! Controller configuration
//!
//! Parsed from command-line flags with environment variable fallbacks.

use std::time::Duration;

use clap::Parser;

use crate::Error;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 25;

/// Client read timeout enforced by kube; watches must close before it fires
const CLIENT_READ_TIMEOUT_SECS: u32 = 30;

/// Default delay before a failed reconciliation is retried
pub const DEFAULT_REQUEUE_SECS: u64 = 5;

/// cattle-controllers - agent-upgrade and binding-annotation reconcilers
#[derive(Parser, Debug, Clone)]
#[command(name = "cattle-controllers", version, about, long_about = None)]
pub struct Config {
    /// Server URL agents are expected to dial.
    ///
    /// When unset, the value of the `server-url` Setting is watched instead.
    #[arg(long, env = "CATTLE_SERVER_URL")]
    pub server_url: Option<String>,

    /// Server-side timeout for watch requests, in seconds
    #[arg(long, env = "CATTLE_WATCH_TIMEOUT_SECS", default_value_t = DEFAULT_WATCH_TIMEOUT_SECS)]
    pub watch_timeout_secs: u32,

    /// Delay before retrying a failed reconciliation, in seconds
    #[arg(long, env = "CATTLE_REQUEUE_SECS", default_value_t = DEFAULT_REQUEUE_SECS)]
    pub requeue_secs: u64,

    /// Do not run the agent-upgrade controllers (Deployment and DaemonSet)
    #[arg(long)]
    pub disable_agent_upgrade: bool,

    /// Do not run the ProjectRoleTemplateBinding ServiceAccount controller
    #[arg(long)]
    pub disable_prtb_service_account: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "CATTLE_LOG_JSON")]
    pub log_json: bool,

    /// Print the CRDs these controllers watch and exit
    #[arg(long)]
    pub crd: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            requeue_secs: DEFAULT_REQUEUE_SECS,
            disable_agent_upgrade: false,
            disable_prtb_service_account: false,
            log_json: false,
            crd: false,
        }
    }
}

impl Config {
    /// Reject configurations the controllers cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.watch_timeout_secs == 0 {
            return Err(Error::config("watch timeout must be non-zero"));
        }
        if self.watch_timeout_secs >= CLIENT_READ_TIMEOUT_SECS {
            return Err(Error::config(format!(
                "watch timeout ({}s) must be below the client read timeout ({}s)",
                self.watch_timeout_secs, CLIENT_READ_TIMEOUT_SECS
            )));
        }
        if self.requeue_secs == 0 {
            return Err(Error::config("requeue delay must be non-zero"));
        }
        if self.server_url.as_deref() == Some("") {
            return Err(Error::config(
                "server URL override is empty; unset it to use the server-url setting",
            ));
        }
        if self.disable_agent_upgrade && self.disable_prtb_service_account {
            return Err(Error::config("all controllers are disabled"));
        }
        Ok(())
    }

    /// Error-policy requeue delay
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}
