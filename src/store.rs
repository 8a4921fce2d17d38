//! Preference storage.
//!
//! Settings are read and written through a [`PreferenceStore`] handle that the
//! caller opens explicitly and closes when the settings session ends. Absent
//! keys read as `None`; the settings layer decides the defaults.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info};

/// Preference keys, one per persisted setting.
pub mod keys {
    pub const NSP_FILTER_FOR_GL: &str = "nsp_file_filter_gl";
    pub const VALIDATE_HOST_NAME: &str = "ns_ip_validation";
    pub const EXPERT_MODE: &str = "expert_mode";
    pub const AUTO_DETECT_IP: &str = "auto_detect_ip";
    pub const RANDOM_PORT: &str = "random_port";
    pub const DONT_SERVE: &str = "not_serve_requests";
    pub const HOST_IP: &str = "host_ip";
    pub const HOST_PORT: &str = "host_port";
    pub const HOST_EXTRA: &str = "host_extra";
    pub const AUTO_CHECK_UPDATES: &str = "auto_check_updates";
    pub const TF_XCI_NSZ_XCZ: &str = "tf_xci_nsz_xcz";
    pub const LANGUAGE: &str = "language";
    pub const GL_VERSION: &str = "gl_version";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse preferences: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("preferences at {0} are in use by another session")]
    Locked(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Typed key-value access to persisted preferences.
pub trait PreferenceStore {
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_bool(&mut self, key: &str, value: bool);
    fn set_string(&mut self, key: &str, value: &str);
    /// Push pending writes to the backing medium.
    fn flush(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Bool(bool),
    Text(String),
}

/// Volatile store. Used in tests and when the preference file cannot be opened.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferenceStore {
    values: BTreeMap<String, Stored>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(Stored::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(Stored::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Stored::Bool(value));
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.to_string(), Stored::Text(value.to_string()));
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// TOML file store holding an exclusive lock for the lifetime of the session.
#[derive(Debug)]
pub struct TomlPreferenceStore {
    path: PathBuf,
    table: toml::Table,
    lock: File,
}

impl TomlPreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        match lock.try_lock_exclusive() {
            Ok(()) => debug!("preferences lock acquired: {}", lock_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(StoreError::Locked(path));
            }
            // fs2 reports contention differently on some platforms
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(StoreError::Locked(path));
            }
            Err(e) => return Err(StoreError::io(&lock_path, e)),
        }

        let table = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            content.parse::<toml::Table>()?
        } else {
            toml::Table::new()
        };
        info!("Opened preferences {} ({} keys)", path.display(), table.len());

        Ok(Self { path, table, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the session lock.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        let _ = self.lock.unlock();
        info!("Closed preferences {}", self.path.display());
        Ok(())
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.get(key).and_then(|v| v.as_bool())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.table
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.table
            .insert(key.to_string(), toml::Value::Boolean(value));
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.table
            .insert(key.to_string(), toml::Value::String(value.to_string()));
    }

    fn flush(&mut self) -> Result<()> {
        let content = toml::to_string(&self.table)?;

        // Write to a temp file then rename so a crash never leaves half a file
        let tmp_path = self.path.with_extension("toml.tmp");
        let mut f = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        f.write_all(content.as_bytes())
            .and_then(|_| f.flush())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(f);
        std::fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        debug!("preferences written to {}", self.path.display());
        Ok(())
    }
}
