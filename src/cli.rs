use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "On-demand launcher for the SyncAnywhere server")]
pub struct Args {
    /// Configuration file (default: smartlaunch.toml next to the executable)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Same as the `background` sub-command
    #[arg(long, hide = true)]
    pub background: bool,

    /// Set on the relaunched, elevated instance
    #[arg(long, hide = true, global = true)]
    pub elevated: bool,

    /// Sub-commands (default: print status, then monitor)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Launch at login (Exit 0 = registered, 1 = failed)
    Install,
    /// Remove the login entry (Exit 0 = removed or absent, 1 = failed)
    Uninstall,
    /// Print server, connection and autostart status
    Status,
    /// Start the server now (Exit 0 = running, 1 = failed)
    Start,
    /// Stop the server now (Exit 0 = stopped, 1 = failed)
    Stop,
    /// Monitor without printing status first
    Background,
    /// Open the firewall for the service port (Exit 0 = usable, 1 = failed)
    Provision,
}
