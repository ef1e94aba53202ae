mod cli;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use smartlaunch::autostart::{self, InstallOutcome, UninstallOutcome};
use smartlaunch::config::{self, LauncherConfig};
use smartlaunch::monitor::Monitor;
use smartlaunch::probe::{self, NetworkProbe};
use smartlaunch::process::{ProcessController, ServerControl, StartOutcome, StopOutcome};
use smartlaunch::provision;
use smartlaunch::status::StatusReport;
use smartlaunch::{logging, shutdown};

fn main() {
    let args = cli::Args::parse();

    let install_dir = match config::install_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("FATAL: cannot locate install directory: {e}");
            std::process::exit(1);
        }
    };
    logging::init(Some(&install_dir.join(config::LOG_FILE_NAME)));

    if let Err(e) = real_main(&args, &install_dir) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main(args: &cli::Args, install_dir: &Path) -> Result<()> {
    let cfg = LauncherConfig::load(args.config.as_deref(), install_dir)
        .context("Failed to load configuration")?;

    match args.sub {
        Some(cli::Cmd::Install) => handle_install(&cfg),
        Some(cli::Cmd::Uninstall) => handle_uninstall(&cfg),
        Some(cli::Cmd::Status) => handle_status(&cfg, install_dir),
        Some(cli::Cmd::Start) => handle_start(&cfg, install_dir),
        Some(cli::Cmd::Stop) => handle_stop(&cfg, install_dir),
        Some(cli::Cmd::Provision) => handle_provision(&cfg, args),
        Some(cli::Cmd::Background) => run_monitor(&cfg, install_dir, true),
        None => run_monitor(&cfg, install_dir, args.background),
    }
}

/// Poll until interrupted. In foreground mode the status block comes first.
fn run_monitor(cfg: &LauncherConfig, install_dir: &Path, background: bool) -> Result<()> {
    if background {
        hide_console();
    }
    shutdown::install_handlers().context("Failed to install interrupt handlers")?;

    let mut controller = ProcessController::new(cfg, install_dir);
    if !background {
        println!("{}", collect_status(cfg, &mut controller)?);
    }

    let timeout = cfg.probe_timeout();
    let probe = NetworkProbe::new(probe::platform_lister(timeout), timeout);
    let mut monitor = Monitor::new(probe, controller, cfg, Instant::now());

    info!("smartlaunch started (pid {})", std::process::id());
    monitor.run(shutdown::shutdown_requested);
    match shutdown::describe() {
        Some(what) => info!("{what} received, smartlaunch exiting"),
        None => info!("smartlaunch exiting"),
    }
    Ok(())
}

fn collect_status(cfg: &LauncherConfig, controller: &mut ProcessController) -> Result<StatusReport> {
    let registrar = autostart::platform_registrar(&cfg.autostart_key())
        .context("Failed to open autostart store")?;
    let timeout = cfg.probe_timeout();
    let probe = NetworkProbe::new(probe::platform_lister(timeout), timeout);
    Ok(StatusReport::collect(
        &cfg.service_name,
        cfg.port,
        &probe,
        &registrar,
        controller.pid(),
    ))
}

/// Handle status command - print the status block
fn handle_status(cfg: &LauncherConfig, install_dir: &Path) -> Result<()> {
    let mut controller = ProcessController::new(cfg, install_dir);
    match collect_status(cfg, &mut controller) {
        Ok(report) => {
            println!("{report}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error checking status: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Handle start command - launch the server once, without monitoring
fn handle_start(cfg: &LauncherConfig, install_dir: &Path) -> Result<()> {
    let mut controller = ProcessController::new(cfg, install_dir);
    match controller.start() {
        Ok(StartOutcome::Started { pid }) => {
            println!("{} started (pid {pid})", cfg.service_name);
            std::process::exit(0);
        }
        Ok(StartOutcome::AlreadyRunning { pid }) => {
            println!("{} is already running (pid {pid})", cfg.service_name);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed to start: {e}");
            std::process::exit(1);
        }
    }
}

/// Handle stop command - stop a server started by any smartlaunch instance
fn handle_stop(cfg: &LauncherConfig, install_dir: &Path) -> Result<()> {
    let mut controller = ProcessController::new(cfg, install_dir);
    match controller.stop() {
        Ok(StopOutcome::NotRunning) => {
            println!("{} is not running", cfg.service_name);
            std::process::exit(0);
        }
        Ok(StopOutcome::Graceful) => {
            println!("{} stopped", cfg.service_name);
            std::process::exit(0);
        }
        Ok(StopOutcome::Forced) => {
            println!(
                "{} did not exit within {}s and was killed",
                cfg.service_name,
                cfg.grace_period().as_secs()
            );
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed to stop: {e}");
            std::process::exit(1);
        }
    }
}

/// Handle install command - register launch at login
fn handle_install(cfg: &LauncherConfig) -> Result<()> {
    let result = autostart::platform_registrar(&cfg.autostart_key()).and_then(|registrar| {
        let outcome = registrar.install()?;
        Ok((outcome, registrar.location()))
    });
    match result {
        Ok((InstallOutcome::Installed, location)) => {
            println!("Autostart enabled ({location})");
            std::process::exit(0);
        }
        Ok((InstallOutcome::Refreshed, location)) => {
            println!("Autostart entry refreshed ({location})");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed to enable autostart: {e}");
            std::process::exit(1);
        }
    }
}

/// Handle uninstall command - remove the login entry
fn handle_uninstall(cfg: &LauncherConfig) -> Result<()> {
    let result =
        autostart::platform_registrar(&cfg.autostart_key()).and_then(|registrar| registrar.uninstall());
    match result {
        Ok(UninstallOutcome::Removed) => {
            println!("Autostart disabled");
            std::process::exit(0);
        }
        Ok(UninstallOutcome::NotPresent) => {
            println!("Autostart was not enabled");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed to disable autostart: {e}");
            std::process::exit(1);
        }
    }
}

/// Handle provision command - elevate if needed, open the firewall
fn handle_provision(cfg: &LauncherConfig, args: &cli::Args) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let fw = provision::platform_firewall();

    let mut relaunch = vec!["provision".to_string()];
    if let Some(path) = &args.config {
        relaunch.push("--config".to_string());
        relaunch.push(path.display().to_string());
    }

    let report = provision::prepare_network_exposure(&fw, cfg, &exe, &relaunch, args.elevated);
    println!("{report}");
    match report.firewall.into_result() {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            eprintln!("Provisioning failed: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn hide_console() {
    use windows::Win32::System::Console::GetConsoleWindow;
    use windows::Win32::UI::WindowsAndMessaging::{SW_HIDE, ShowWindow};

    unsafe {
        let hwnd = GetConsoleWindow();
        if !hwnd.is_invalid() {
            let _ = ShowWindow(hwnd, SW_HIDE);
        }
    }
}

#[cfg(not(windows))]
fn hide_console() {}
