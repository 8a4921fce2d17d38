pub mod i18n;
pub mod locale;
pub mod settings;
pub mod store;
pub mod utils;

pub use settings::{Collaborators, SettingsController, SettingsState};
pub use store::{PreferenceStore, TomlPreferenceStore};
