use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::store::{keys, PreferenceStore};

mod controller;
pub mod interlock;
pub mod validators;

pub use controller::{
    Collaborators, EditOutcome, Notification, NotificationLevel, SettingsController, TextField,
};
pub use interlock::{Focus, Toggle, Transition};
pub use validators::Rejection;

/// Default UI language code; always present in the locale catalog.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Goldleaf protocol versions the transfer side can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlVersion {
    #[default]
    V0_5,
    V0_7x,
    V0_8,
}

impl GlVersion {
    pub const ALL: [GlVersion; 3] = [GlVersion::V0_5, GlVersion::V0_7x, GlVersion::V0_8];

    pub fn as_str(self) -> &'static str {
        match self {
            GlVersion::V0_5 => "v0.5",
            GlVersion::V0_7x => "v0.7.x",
            GlVersion::V0_8 => "v0.8",
        }
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownGlVersion(pub String);

impl fmt::Display for UnknownGlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown Goldleaf version: {}", self.0)
    }
}

impl std::error::Error for UnknownGlVersion {}

impl FromStr for GlVersion {
    type Err = UnknownGlVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GlVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownGlVersion(s.to_string()))
    }
}

/// Snapshot of every persisted setting for one settings session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsState {
    pub nsp_filter_for_gl: bool,
    pub validate_host_name: bool,
    pub expert_mode: bool,
    pub auto_detect_ip: bool,
    pub random_port: bool,
    pub dont_serve: bool,
    pub host_ip: String,
    pub host_port: String,
    pub host_extra: String,
    pub auto_check_updates: bool,
    // Also covers NSZ/XCZ
    pub tf_xci_nsz_xcz_support: bool,
    pub language: String,
    pub gl_version: GlVersion,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            nsp_filter_for_gl: false,
            validate_host_name: false,
            expert_mode: false,
            // Automatic network setup until the user opts out
            auto_detect_ip: true,
            random_port: true,
            dont_serve: false,
            host_ip: String::new(),
            host_port: String::new(),
            host_extra: String::new(),
            auto_check_updates: false,
            tf_xci_nsz_xcz_support: false,
            language: DEFAULT_LANGUAGE.to_string(),
            gl_version: GlVersion::default(),
        }
    }
}

impl SettingsState {
    /// Read every field verbatim; absent keys take the defaults.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let d = Self::default();
        let flag = |key: &str, default: bool| store.get_bool(key).unwrap_or(default);
        let text = |key: &str, default: &str| {
            store
                .get_string(key)
                .unwrap_or_else(|| default.to_string())
        };

        let gl_version = match store.get_string(keys::GL_VERSION) {
            Some(raw) => raw.parse::<GlVersion>().unwrap_or_else(|e: UnknownGlVersion| {
                warn!("{}; using {}", e, d.gl_version);
                d.gl_version
            }),
            None => d.gl_version,
        };

        Self {
            nsp_filter_for_gl: flag(keys::NSP_FILTER_FOR_GL, d.nsp_filter_for_gl),
            validate_host_name: flag(keys::VALIDATE_HOST_NAME, d.validate_host_name),
            expert_mode: flag(keys::EXPERT_MODE, d.expert_mode),
            auto_detect_ip: flag(keys::AUTO_DETECT_IP, d.auto_detect_ip),
            random_port: flag(keys::RANDOM_PORT, d.random_port),
            dont_serve: flag(keys::DONT_SERVE, d.dont_serve),
            host_ip: text(keys::HOST_IP, &d.host_ip),
            host_port: text(keys::HOST_PORT, &d.host_port),
            host_extra: text(keys::HOST_EXTRA, &d.host_extra),
            auto_check_updates: flag(keys::AUTO_CHECK_UPDATES, d.auto_check_updates),
            tf_xci_nsz_xcz_support: flag(keys::TF_XCI_NSZ_XCZ, d.tf_xci_nsz_xcz_support),
            language: text(keys::LANGUAGE, &d.language),
            gl_version,
        }
    }

    /// Write every field, unconditionally.
    pub fn store(&self, store: &mut dyn PreferenceStore) {
        store.set_bool(keys::NSP_FILTER_FOR_GL, self.nsp_filter_for_gl);
        store.set_bool(keys::VALIDATE_HOST_NAME, self.validate_host_name);
        store.set_bool(keys::EXPERT_MODE, self.expert_mode);
        store.set_bool(keys::AUTO_DETECT_IP, self.auto_detect_ip);
        store.set_bool(keys::RANDOM_PORT, self.random_port);
        store.set_bool(keys::DONT_SERVE, self.dont_serve);
        store.set_string(keys::HOST_IP, &self.host_ip);
        store.set_string(keys::HOST_PORT, &self.host_port);
        store.set_string(keys::HOST_EXTRA, &self.host_extra);
        store.set_bool(keys::AUTO_CHECK_UPDATES, self.auto_check_updates);
        store.set_bool(keys::TF_XCI_NSZ_XCZ, self.tf_xci_nsz_xcz_support);
        store.set_string(keys::LANGUAGE, &self.language);
        store.set_string(keys::GL_VERSION, self.gl_version.as_str());
    }
}

/// Editability flags computed from a [`SettingsState`]; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub ip_field_editable: bool,
    pub port_field_editable: bool,
    pub extra_field_editable: bool,
    pub auto_detect_toggle_editable: bool,
    pub random_port_toggle_editable: bool,
    pub expert_group_enabled: bool,
}

impl Derived {
    pub fn of(state: &SettingsState) -> Self {
        Self {
            ip_field_editable: !state.auto_detect_ip,
            port_field_editable: !state.random_port,
            extra_field_editable: state.dont_serve,
            auto_detect_toggle_editable: !state.dont_serve,
            random_port_toggle_editable: !state.dont_serve,
            expert_group_enabled: state.expert_mode,
        }
    }
}
