//! XDG autostart desktop files (`$XDG_CONFIG_HOME/autostart/<key>.desktop`).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{AutostartEntry, AutostartStore};
use crate::error::{LauncherError, Result};

pub struct XdgAutostartStore {
    dir: PathBuf,
}

impl XdgAutostartStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_current_user() -> Result<Self> {
        let config = dirs::config_dir().ok_or_else(|| {
            LauncherError::persistence("xdg autostart", "could not determine config directory")
        })?;
        Ok(Self::new(config.join("autostart")))
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.desktop"))
    }

    fn error(&self, path: &Path, e: std::io::Error) -> LauncherError {
        LauncherError::persistence(path.display().to_string(), e)
    }
}

fn render(entry: &AutostartEntry) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name={key}\n\
         Comment=Starts the sync server on demand\n\
         Exec={exec}\n\
         Terminal=false\n\
         NoDisplay=true\n\
         X-GNOME-Autostart-enabled=true\n",
        key = entry.key_name,
        exec = entry.command_line(),
    )
}

fn exec_line(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("Exec="))
        .map(|s| s.trim().to_string())
}

impl AutostartStore for XdgAutostartStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.file_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(exec_line(&content).unwrap_or_default())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(&path, e)),
        }
    }

    fn write(&self, entry: &AutostartEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.error(&self.dir, e))?;
        let path = self.file_for(&entry.key_name);
        std::fs::write(&path, render(entry)).map_err(|e| self.error(&path, e))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.file_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(&path, e)),
        }
    }
}
