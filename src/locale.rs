use std::io;
use std::path::PathBuf;

use rust_embed::RustEmbed;
use tracing::{debug, warn};

use crate::settings::DEFAULT_LANGUAGE;
use crate::utils::paths;

/// Locale pack resources are named `locale_<ccc>...`.
pub const LOCALE_PREFIX: &str = "locale_";
const CODE_LEN: usize = 3;

/// Where the application's bundled resources come from.
pub trait ResourceSource {
    fn list_installed_resources(&self) -> io::Result<Vec<String>>;
    fn read_resource(&self, name: &str) -> Option<String>;
}

/// Resources compiled into the binary (packaged build).
#[derive(RustEmbed)]
#[folder = "i18n/"]
struct Bundled;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedResources;

impl ResourceSource for EmbeddedResources {
    fn list_installed_resources(&self) -> io::Result<Vec<String>> {
        Ok(Bundled::iter().map(|name| name.into_owned()).collect())
    }

    fn read_resource(&self, name: &str) -> Option<String> {
        let file = Bundled::get(name)?;
        Some(String::from_utf8_lossy(file.data.as_ref()).into_owned())
    }
}

/// Resources lying loose in a directory (development tree or unpacked install).
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceSource for DirectoryResources {
    fn list_installed_resources(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn read_resource(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(name)).ok()
    }
}

/// Pick the resource source once at startup.
///
/// `NSUSBLOADER_RESOURCE_DIR` or an `i18n/` directory beside the executable
/// select the unpackaged layout; otherwise the embedded packs are used.
pub fn resource_source_for_runtime() -> Box<dyn ResourceSource> {
    if let Ok(dir) = std::env::var("NSUSBLOADER_RESOURCE_DIR") {
        let dir = dir.trim();
        if !dir.is_empty() {
            debug!("locale packs from {}", dir);
            return Box::new(DirectoryResources::new(dir));
        }
    }
    if let Some(dir) = paths::exe_dir().map(|d| d.join("i18n")) {
        if dir.is_dir() {
            debug!("locale packs from {}", dir.display());
            return Box::new(DirectoryResources::new(dir));
        }
    }
    Box::new(EmbeddedResources)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleEntry {
    pub code: String,
    /// Backing resource name; `None` for the built-in English base.
    pub resource: Option<String>,
}

/// Extract the language code from a resource name, if it is a locale pack.
pub fn locale_code(resource: &str) -> Option<&str> {
    let rest = resource.strip_prefix(LOCALE_PREFIX)?;
    rest.get(..CODE_LEN)
}

/// Installed language packs, "eng" first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleCatalog {
    entries: Vec<LocaleEntry>,
}

impl Default for LocaleCatalog {
    fn default() -> Self {
        Self {
            entries: vec![LocaleEntry {
                code: DEFAULT_LANGUAGE.to_string(),
                resource: None,
            }],
        }
    }
}

impl LocaleCatalog {
    pub fn discover(source: &dyn ResourceSource) -> Self {
        let mut catalog = Self::default();
        let mut names = match source.list_installed_resources() {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to enumerate locale packs: {}", e);
                return catalog;
            }
        };
        names.sort();

        for name in names {
            let Some(code) = locale_code(&name) else {
                continue;
            };
            match catalog.entries.iter_mut().find(|e| e.code == code) {
                // A pack for the base language replaces the built-in entry
                Some(existing) if existing.resource.is_none() => {
                    existing.resource = Some(name.clone());
                }
                Some(_) => {}
                None => catalog.entries.push(LocaleEntry {
                    code: code.to_string(),
                    resource: Some(name.clone()),
                }),
            }
        }
        debug!("locale catalog: {:?}", catalog.codes().collect::<Vec<_>>());
        catalog
    }

    pub fn entries(&self) -> &[LocaleEntry] {
        &self.entries
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.code.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    pub fn resource_for(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .and_then(|e| e.resource.as_deref())
    }

    /// The persisted code if it is installed, else the default.
    pub fn select<'a>(&'a self, persisted: &'a str) -> &'a str {
        if self.contains(persisted) {
            persisted
        } else {
            DEFAULT_LANGUAGE
        }
    }
}
