//! Per-user Run key in the Windows registry.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use ::windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, WIN32_ERROR};
use ::windows::Win32::System::Registry::{
    HKEY_CURRENT_USER, REG_SZ, RRF_RT_REG_SZ, RegDeleteKeyValueW, RegGetValueW, RegSetKeyValueW,
};
use ::windows::core::PCWSTR;

use super::{AutostartEntry, AutostartStore};
use crate::error::{LauncherError, Result};

const RUN_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Run";

pub struct RunKeyStore;

impl RunKeyStore {
    pub fn for_current_user() -> Result<Self> {
        Ok(Self)
    }

    fn check(&self, op: &str, code: WIN32_ERROR) -> Result<()> {
        code.ok()
            .map_err(|e| LauncherError::persistence(self.location(), format!("{op} failed: {e}")))
    }
}

/// NUL-terminated UTF-16 copy of `s`.
fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

impl AutostartStore for RunKeyStore {
    fn location(&self) -> String {
        format!("HKCU\\{RUN_KEY}")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let subkey = wide(RUN_KEY);
        let name = wide(key);

        let mut size: u32 = 0;
        let code = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(subkey.as_ptr()),
                PCWSTR(name.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                None,
                Some(&mut size),
            )
        };
        if code == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        self.check("RegGetValueW (size)", code)?;

        let mut buf = vec![0u16; (size as usize).div_ceil(2)];
        let code = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                PCWSTR(subkey.as_ptr()),
                PCWSTR(name.as_ptr()),
                RRF_RT_REG_SZ,
                None,
                Some(buf.as_mut_ptr().cast()),
                Some(&mut size),
            )
        };
        if code == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        self.check("RegGetValueW", code)?;

        let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
        Ok(Some(String::from_utf16_lossy(&buf[..len])))
    }

    fn write(&self, entry: &AutostartEntry) -> Result<()> {
        let subkey = wide(RUN_KEY);
        let name = wide(&entry.key_name);
        let value = wide(&entry.command_line());
        let bytes = u32::try_from(value.len() * 2)
            .map_err(|_| LauncherError::persistence(self.location(), "command line too long"))?;

        let code = unsafe {
            RegSetKeyValueW(
                HKEY_CURRENT_USER,
                PCWSTR(subkey.as_ptr()),
                PCWSTR(name.as_ptr()),
                REG_SZ.0,
                Some(value.as_ptr().cast()),
                bytes,
            )
        };
        self.check("RegSetKeyValueW", code)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let subkey = wide(RUN_KEY);
        let name = wide(key);

        let code = unsafe {
            RegDeleteKeyValueW(HKEY_CURRENT_USER, PCWSTR(subkey.as_ptr()), PCWSTR(name.as_ptr()))
        };
        if code == ERROR_FILE_NOT_FOUND {
            return Ok(false);
        }
        self.check("RegDeleteKeyValueW", code)?;
        Ok(true)
    }
}
