//! env_logger setup: `[timestamp LEVEL file:line] message`, written to stderr
//! and appended to `launcher.log` next to the executable.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use log::LevelFilter;

/// Copies every write to stderr and the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // the file is best effort; stderr decides the result
        let _ = self.file.write_all(buf);
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.file.flush();
        io::stderr().flush()
    }
}

/// Initialise the global logger. Default level is `info`; `RUST_LOG`
/// overrides it. Without a usable log file, output goes to stderr only.
pub fn init(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env();

    let mut fallback = None;
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
            }
            Err(e) => fallback = Some(format!("{}: {e}", path.display())),
        }
    }

    // a logger may already be installed (tests, repeated init)
    if builder.try_init().is_ok()
        && let Some(reason) = fallback
    {
        log::warn!("Log file unavailable, logging to stderr only ({reason})");
    }
}
