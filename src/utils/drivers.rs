use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::info;

use crate::i18n::Localizer;

#[derive(Error, Debug)]
pub enum DriverInstallError {
    #[error("drivers installer is only available on Windows")]
    Unsupported,

    #[error("no drivers installer configured")]
    NotConfigured,

    #[error("failed to start drivers installer {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Platform routine that installs the USB drivers.
pub trait DriverInstaller {
    /// Start the installation. Returns once it is dispatched; the installer runs on its own.
    fn install(&self, localizer: &Localizer) -> Result<(), DriverInstallError>;
}

/// Launches an external installer executable and leaves it running.
#[derive(Debug, Clone)]
pub struct CommandDriverInstaller {
    program: Option<PathBuf>,
}

impl CommandDriverInstaller {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    /// `NSUSBLOADER_DRIVERS_INSTALLER` names the installer executable.
    pub fn from_env() -> Self {
        let program = std::env::var_os("NSUSBLOADER_DRIVERS_INSTALLER")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self { program }
    }
}

impl DriverInstaller for CommandDriverInstaller {
    fn install(&self, localizer: &Localizer) -> Result<(), DriverInstallError> {
        let program = self
            .program
            .as_ref()
            .ok_or(DriverInstallError::NotConfigured)?;
        info!(
            "[Drivers] {}: {}",
            localizer.tr("windowTitleDriversInstall"),
            program.display()
        );
        Command::new(program)
            .env("NSUSBLOADER_LANG", localizer.code())
            .spawn()
            .map_err(|source| DriverInstallError::Spawn {
                path: program.clone(),
                source,
            })?;
        Ok(())
    }
}
