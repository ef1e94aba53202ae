//! LaunchAgent plist in `~/Library/LaunchAgents`; launchd runs it at login.

use std::io::ErrorKind;
use std::path::PathBuf;

use plist::{Dictionary, Value};

use super::{AutostartEntry, AutostartStore};
use crate::error::{LauncherError, Result};

pub struct LaunchAgentStore {
    dir: PathBuf,
}

impl LaunchAgentStore {
    pub fn for_current_user() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            LauncherError::persistence("LaunchAgents", "could not determine home directory")
        })?;
        Ok(Self {
            dir: home.join("Library").join("LaunchAgents"),
        })
    }

    fn plist_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.plist", label(key)))
    }

    fn error(&self, reason: impl ToString) -> LauncherError {
        LauncherError::persistence(self.location(), reason)
    }
}

fn label(key: &str) -> String {
    format!("com.syncanywhere.{}", key.to_lowercase())
}

/// launchd agent definition for `entry`
fn agent_plist(entry: &AutostartEntry) -> Value {
    let mut program_args = vec![Value::String(entry.program.display().to_string())];
    program_args.extend(entry.args.iter().map(|a| Value::String(a.clone())));

    let mut dict = Dictionary::new();
    dict.insert("Label".to_string(), Value::String(label(&entry.key_name)));
    dict.insert("ProgramArguments".to_string(), Value::Array(program_args));
    dict.insert("RunAtLoad".to_string(), Value::Boolean(true));
    dict.insert("KeepAlive".to_string(), Value::Boolean(false));
    dict.insert(
        "ProcessType".to_string(),
        Value::String("Background".to_string()),
    );
    Value::Dictionary(dict)
}

impl AutostartStore for LaunchAgentStore {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.plist_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let value = Value::from_file(&path)
            .map_err(|e| self.error(format!("{}: {e}", path.display())))?;

        let args: Vec<String> = value
            .as_dictionary()
            .and_then(|d| d.get("ProgramArguments"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_string).map(str::to_string).collect())
            .unwrap_or_default();

        let line = match args.split_first() {
            Some((program, rest)) => {
                let mut line = format!("\"{program}\"");
                for arg in rest {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
            None => String::new(),
        };
        Ok(Some(line))
    }

    fn write(&self, entry: &AutostartEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.error(e))?;
        agent_plist(entry)
            .to_file_xml(self.plist_for(&entry.key_name))
            .map_err(|e| self.error(format!("failed to write plist: {e}")))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.plist_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(e)),
        }
    }
}
