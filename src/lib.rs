//! On-demand launcher for a local sync server.
//!
//! The server is started when its port sees activity and stopped once it has
//! been idle for a while. Around that loop sit the one-shot pieces: login
//! autostart registration, firewall provisioning and a status report.

pub mod autostart;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod probe;
pub mod process;
pub mod provision;
pub mod shutdown;
pub mod status;

pub use error::{LauncherError, Result};
