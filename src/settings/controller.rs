use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::interlock::{self, Focus, Toggle};
use super::validators::{validate_no_whitespace, validate_port, Rejection};
use super::{Derived, GlVersion, SettingsState};
use crate::i18n::Localizer;
use crate::locale::{resource_source_for_runtime, LocaleCatalog, ResourceSource};
use crate::store::{self, keys, PreferenceStore};
use crate::utils::drivers::{CommandDriverInstaller, DriverInstallError, DriverInstaller};
use crate::utils::open::open_url;
use crate::utils::platform::{current_os_name, is_windows_os};
use crate::utils::update::{
    release_tag_url, spawn_update_check, GithubUpdateChecker, UpdateChecker, UpdateOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Message the UI should pop up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    HostIp,
    HostPort,
    HostExtra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Rejected(Rejection),
}

/// Everything the controller talks to besides the preference store.
pub struct Collaborators {
    pub resources: Box<dyn ResourceSource>,
    pub updates: Arc<dyn UpdateChecker>,
    pub drivers: Box<dyn DriverInstaller>,
    /// (owner, repo) used for the release link.
    pub release_repo: (String, String),
    pub os_name: String,
    /// Opens a URL in the user's browser.
    pub open_link: fn(&str),
}

impl Collaborators {
    pub fn for_runtime() -> Self {
        let updates = GithubUpdateChecker::from_env();
        let release_repo = (updates.owner().to_string(), updates.repo().to_string());
        Self {
            resources: resource_source_for_runtime(),
            updates: Arc::new(updates),
            drivers: Box::new(CommandDriverInstaller::from_env()),
            release_repo,
            os_name: current_os_name().to_string(),
            open_link: open_url,
        }
    }
}

/// One settings session: loaded on open, written back on commit.
pub struct SettingsController<S: PreferenceStore> {
    store: S,
    state: SettingsState,
    derived: Derived,
    focus: Option<Focus>,
    catalog: LocaleCatalog,
    localizer: Localizer,
    notifications: VecDeque<Notification>,
    version_link: Option<String>,
    collab: Collaborators,
    update_tx: Sender<UpdateOutcome>,
    update_rx: Receiver<UpdateOutcome>,
}

impl<S: PreferenceStore> SettingsController<S> {
    pub fn open(store: S, collab: Collaborators) -> Self {
        let mut state = interlock::on_load(SettingsState::load(&store));

        let catalog = LocaleCatalog::discover(collab.resources.as_ref());
        let language = catalog.select(&state.language).to_string();
        if language != state.language {
            debug!(
                "language {:?} not installed, selecting {}",
                state.language, language
            );
            state.language = language;
        }
        let localizer = Localizer::load(collab.resources.as_ref(), &state.language);

        let derived = Derived::of(&state);
        let (update_tx, update_rx) = mpsc::channel();
        info!(
            "Settings session opened (language={}, gl={})",
            state.language, state.gl_version
        );

        Self {
            store,
            state,
            derived,
            focus: None,
            catalog,
            localizer,
            notifications: VecDeque::new(),
            version_link: None,
            collab,
            update_tx,
            update_rx,
        }
    }

    pub fn state(&self) -> &SettingsState {
        &self.state
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }

    pub fn catalog(&self) -> &LocaleCatalog {
        &self.catalog
    }

    pub fn gl_versions(&self) -> &'static [GlVersion] {
        &GlVersion::ALL
    }

    /// Focus hint from the last toggle, cleared on read.
    pub fn take_focus(&mut self) -> Option<Focus> {
        self.focus.take()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn notify(&mut self, level: NotificationLevel, title: String, body: String) {
        self.notifications.push_back(Notification { level, title, body });
    }

    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::HostIp => &self.state.host_ip,
            TextField::HostPort => &self.state.host_port,
            TextField::HostExtra => &self.state.host_extra,
        }
    }

    fn editable(&self, field: TextField) -> bool {
        match field {
            TextField::HostIp => self.derived.ip_field_editable,
            TextField::HostPort => self.derived.port_field_editable,
            TextField::HostExtra => self.derived.extra_field_editable,
        }
    }

    pub fn edit_text(&mut self, field: TextField, proposed: &str) -> EditOutcome {
        if !self.editable(field) {
            debug!("edit of {:?} refused: field locked", field);
            return EditOutcome::Rejected(Rejection::Locked);
        }
        let current = self.text(field);
        let verdict = match field {
            TextField::HostIp | TextField::HostExtra => validate_no_whitespace(current, proposed),
            TextField::HostPort => validate_port(current, proposed),
        };
        if let Err(rejection) = verdict {
            if rejection.is_user_visible() {
                warn!("Rejected port {:?}: {}", proposed, rejection);
                let title = self.localizer.tr("windowTitleErrorPort");
                let body = self.localizer.tr("windowBodyErrorPort");
                self.notify(NotificationLevel::Error, title, body);
            } else {
                debug!("edit of {:?} refused: {}", field, rejection);
            }
            return EditOutcome::Rejected(rejection);
        }

        let slot = match field {
            TextField::HostIp => &mut self.state.host_ip,
            TextField::HostPort => &mut self.state.host_port,
            TextField::HostExtra => &mut self.state.host_extra,
        };
        *slot = proposed.to_string();
        EditOutcome::Applied
    }

    pub fn toggle(&mut self, toggle: Toggle, value: bool) -> Option<Focus> {
        let t = interlock::apply(&self.state, toggle, value);
        debug!("{:?} -> {} ({:?})", toggle, value, t.derived);
        self.state = t.state;
        self.derived = t.derived;
        self.focus = t.focus;
        t.focus
    }

    pub fn set_nsp_filter_for_gl(&mut self, value: bool) {
        self.state.nsp_filter_for_gl = value;
    }

    pub fn set_validate_host_name(&mut self, value: bool) {
        self.state.validate_host_name = value;
    }

    pub fn set_auto_check_updates(&mut self, value: bool) {
        self.state.auto_check_updates = value;
    }

    pub fn set_tf_xci_nsz_xcz_support(&mut self, value: bool) {
        self.state.tf_xci_nsz_xcz_support = value;
    }

    pub fn set_gl_version(&mut self, version: GlVersion) {
        self.state.gl_version = version;
    }

    /// Select an installed language. Unknown codes are ignored.
    pub fn select_language(&mut self, code: &str) -> bool {
        if !self.catalog.contains(code) {
            debug!("language {:?} is not installed", code);
            return false;
        }
        self.state.language = code.to_string();
        true
    }

    /// Persist the selected language right away; it takes effect after restart.
    pub fn apply_language(&mut self) -> store::Result<()> {
        let code = self.state.language.clone();
        self.store.set_string(keys::LANGUAGE, &code);
        self.store.flush()?;
        info!("UI language set to {}", code);

        // Told in the language the user just picked
        let target = Localizer::load(self.collab.resources.as_ref(), &code);
        self.notify(
            NotificationLevel::Info,
            String::new(),
            target.tr("windowBodyRestartToApplyLang"),
        );
        Ok(())
    }

    /// Start a background update check; results arrive via [`Self::poll_updates`].
    pub fn check_for_updates(&mut self) {
        info!("Checking for updates");
        if let Err(e) = spawn_update_check(self.collab.updates.clone(), self.update_tx.clone()) {
            warn!("Failed to start update check: {}", e);
            self.on_update_outcome(UpdateOutcome::Unknown);
        }
    }

    /// Handle every finished check. Returns how many were handled.
    pub fn poll_updates(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(outcome) = self.update_rx.try_recv() {
            self.on_update_outcome(outcome);
            handled += 1;
        }
        handled
    }

    /// Block until one check finishes, for front ends without an event loop.
    pub fn wait_for_update(&mut self, timeout: Duration) -> Option<UpdateOutcome> {
        let outcome = self.update_rx.recv_timeout(timeout).ok()?;
        self.on_update_outcome(outcome.clone());
        Some(outcome)
    }

    fn on_update_outcome(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::NoUpdate => {
                let title = self.localizer.tr("windowTitleNewVersionNOTAval");
                let body = self.localizer.tr("windowBodyNewVersionNOTAval");
                self.notify(NotificationLevel::Info, title, body);
            }
            UpdateOutcome::Available { version, notes } => {
                let (owner, repo) = &self.collab.release_repo;
                self.version_link = Some(release_tag_url(owner, repo, &version));
                let title = self.localizer.tr("windowTitleNewVersionAval");
                let body = format!("{}: {}\n\n{}", title, version, notes);
                self.notify(NotificationLevel::Info, title, body);
            }
            UpdateOutcome::Unknown => {
                let title = self.localizer.tr("windowTitleNewVersionUnknown");
                let body = self.localizer.tr("windowBodyNewVersionUnknown");
                self.notify(NotificationLevel::Info, title, body);
            }
        }
    }

    /// Release page of the newest version, once a check found one.
    pub fn version_link(&self) -> Option<&str> {
        self.version_link.as_deref()
    }

    pub fn open_version_link(&self) -> bool {
        match self.version_link() {
            Some(url) => {
                info!("Opening {}", url);
                (self.collab.open_link)(url);
                true
            }
            None => false,
        }
    }

    pub fn drivers_offered(&self) -> bool {
        is_windows_os(&self.collab.os_name)
    }

    pub fn install_drivers(&mut self) -> Result<(), DriverInstallError> {
        if !self.drivers_offered() {
            return Err(DriverInstallError::Unsupported);
        }
        info!("Starting drivers installation");
        if let Err(e) = self.collab.drivers.install(&self.localizer) {
            warn!("Drivers installation failed: {}", e);
            let title = self.localizer.tr("windowTitleDriversInstall");
            let body = self.localizer.tr("windowBodyDriversInstallFailed");
            self.notify(NotificationLevel::Error, title, body);
            return Err(e);
        }
        Ok(())
    }

    /// Write every setting back and hand the store back to the caller.
    pub fn commit(mut self) -> store::Result<S> {
        self.state.store(&mut self.store);
        self.store.flush()?;
        info!("Settings session committed");
        Ok(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::EmbeddedResources;
    use crate::store::{MemoryPreferenceStore, TomlPreferenceStore};
    use crate::utils::update::UpdateInfo;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Fixed(Option<UpdateInfo>);

    impl UpdateChecker for Fixed {
        fn check(&self) -> Option<UpdateInfo> {
            self.0.clone()
        }
    }

    struct Counting(Rc<Cell<usize>>, bool);

    impl DriverInstaller for Counting {
        fn install(&self, _localizer: &Localizer) -> Result<(), DriverInstallError> {
            self.0.set(self.0.get() + 1);
            if self.1 {
                Ok(())
            } else {
                Err(DriverInstallError::NotConfigured)
            }
        }
    }

    fn collab(update: Option<UpdateInfo>, os: &str) -> Collaborators {
        Collaborators {
            resources: Box::new(EmbeddedResources),
            updates: Arc::new(Fixed(update)),
            drivers: Box::new(Counting(Rc::new(Cell::new(0)), true)),
            release_repo: ("developersu".into(), "ns-usbloader".into()),
            os_name: os.into(),
            open_link: record_link,
        }
    }

    thread_local! {
        static OPENED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn record_link(url: &str) {
        OPENED.with(|o| o.borrow_mut().push(url.to_string()));
    }

    fn session(store: MemoryPreferenceStore) -> SettingsController<MemoryPreferenceStore> {
        SettingsController::open(store, collab(None, "Linux"))
    }

    fn full_store() -> MemoryPreferenceStore {
        let mut store = MemoryPreferenceStore::new();
        store.set_bool(keys::NSP_FILTER_FOR_GL, true);
        store.set_bool(keys::VALIDATE_HOST_NAME, true);
        store.set_bool(keys::EXPERT_MODE, true);
        store.set_bool(keys::AUTO_DETECT_IP, false);
        store.set_bool(keys::RANDOM_PORT, true);
        store.set_bool(keys::DONT_SERVE, false);
        store.set_string(keys::HOST_IP, "192.168.1.42");
        store.set_string(keys::HOST_PORT, "6042");
        store.set_string(keys::HOST_EXTRA, "");
        store.set_bool(keys::AUTO_CHECK_UPDATES, true);
        store.set_bool(keys::TF_XCI_NSZ_XCZ, false);
        store.set_string(keys::LANGUAGE, "rus");
        store.set_string(keys::GL_VERSION, "v0.7.x");
        store
    }

    #[test]
    fn untouched_session_round_trips() {
        let before = full_store();
        let after = session(before.clone()).commit().unwrap();
        assert_eq!(SettingsState::load(&after), SettingsState::load(&before));
        assert_eq!(after.get_string(keys::LANGUAGE).as_deref(), Some("rus"));
        assert_eq!(after.get_bool(keys::AUTO_DETECT_IP), Some(false));
    }

    #[test]
    fn untouched_session_rewrites_identical_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let mut seed = TomlPreferenceStore::open(&path).unwrap();
        SettingsState {
            host_ip: "10.1.1.1".into(),
            language: "ukr".into(),
            gl_version: GlVersion::V0_8,
            ..SettingsState::default()
        }
        .store(&mut seed);
        seed.close().unwrap();
        let before = std::fs::read(&path).unwrap();

        let store = TomlPreferenceStore::open(&path).unwrap();
        let ctl = SettingsController::open(store, collab(None, "Linux"));
        ctl.commit().unwrap().close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn persisted_dont_serve_overrides_stale_auto_ip() {
        let mut store = MemoryPreferenceStore::new();
        store.set_bool(keys::DONT_SERVE, true);
        store.set_bool(keys::AUTO_DETECT_IP, true);
        store.set_bool(keys::RANDOM_PORT, true);
        let ctl = session(store);
        assert!(!ctl.state().auto_detect_ip);
        assert!(!ctl.state().random_port);
        assert!(!ctl.derived().auto_detect_toggle_editable);
        assert!(ctl.derived().ip_field_editable);
        assert!(ctl.derived().extra_field_editable);
    }

    #[test]
    fn whitespace_edit_leaves_state_alone() {
        let mut ctl = session(full_store());
        assert_eq!(
            ctl.edit_text(TextField::HostIp, "192.168.1.4 2"),
            EditOutcome::Rejected(Rejection::Whitespace)
        );
        assert_eq!(ctl.text(TextField::HostIp), "192.168.1.42");
        assert!(ctl.take_notifications().is_empty());

        assert_eq!(ctl.edit_text(TextField::HostIp, "10.0.0.1"), EditOutcome::Applied);
        assert_eq!(ctl.state().host_ip, "10.0.0.1");
    }

    #[test]
    fn port_range_rejection_notifies() {
        let mut store = full_store();
        store.set_string(keys::LANGUAGE, "eng");
        let mut ctl = session(store);
        ctl.toggle(Toggle::RandomPort, false);

        assert_eq!(
            ctl.edit_text(TextField::HostPort, "123ab"),
            EditOutcome::Rejected(Rejection::PortPattern)
        );
        assert!(ctl.take_notifications().is_empty());

        assert_eq!(
            ctl.edit_text(TextField::HostPort, "65536"),
            EditOutcome::Rejected(Rejection::PortRange)
        );
        let notes = ctl.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].title, "Incorrect port set!");
        assert_eq!(ctl.state().host_port, "6042");

        assert_eq!(ctl.edit_text(TextField::HostPort, ""), EditOutcome::Applied);
        assert_eq!(ctl.edit_text(TextField::HostPort, "8080"), EditOutcome::Applied);
        assert_eq!(ctl.state().host_port, "8080");
    }

    #[test]
    fn locked_fields_refuse_edits() {
        let mut ctl = session(MemoryPreferenceStore::new());
        assert_eq!(
            ctl.edit_text(TextField::HostIp, "10.0.0.1"),
            EditOutcome::Rejected(Rejection::Locked)
        );
        assert_eq!(
            ctl.edit_text(TextField::HostExtra, "x"),
            EditOutcome::Rejected(Rejection::Locked)
        );

        assert_eq!(ctl.toggle(Toggle::DontServe, true), Some(Focus::HostIp));
        assert_eq!(ctl.take_focus(), Some(Focus::HostIp));
        assert_eq!(ctl.take_focus(), None);
        assert_eq!(ctl.edit_text(TextField::HostExtra, "/games"), EditOutcome::Applied);
        assert_eq!(ctl.edit_text(TextField::HostPort, "6042"), EditOutcome::Applied);
    }

    #[test]
    fn toggles_are_committed() {
        let mut ctl = session(MemoryPreferenceStore::new());
        ctl.toggle(Toggle::DontServe, true);
        ctl.toggle(Toggle::ExpertMode, true);
        ctl.set_gl_version(GlVersion::V0_8);
        ctl.set_tf_xci_nsz_xcz_support(true);
        let store = ctl.commit().unwrap();
        assert_eq!(store.get_bool(keys::DONT_SERVE), Some(true));
        assert_eq!(store.get_bool(keys::AUTO_DETECT_IP), Some(false));
        assert_eq!(store.get_bool(keys::RANDOM_PORT), Some(false));
        assert_eq!(store.get_bool(keys::EXPERT_MODE), Some(true));
        assert_eq!(store.get_bool(keys::TF_XCI_NSZ_XCZ), Some(true));
        assert_eq!(store.get_string(keys::GL_VERSION).as_deref(), Some("v0.8"));
    }

    #[test]
    fn uninstalled_language_falls_back_to_eng() {
        let mut store = MemoryPreferenceStore::new();
        store.set_string(keys::LANGUAGE, "klingon");
        let mut ctl = session(store);
        assert_eq!(ctl.state().language, "eng");
        assert_eq!(ctl.catalog().codes().next(), Some("eng"));
        assert!(!ctl.select_language("xyz"));
        assert!(ctl.select_language("ukr"));
        assert_eq!(ctl.state().language, "ukr");
    }

    #[test]
    fn applying_language_persists_immediately() {
        let mut ctl = session(MemoryPreferenceStore::new());
        assert!(ctl.select_language("rus"));
        ctl.apply_language().unwrap();
        let notes = ctl.take_notifications();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].title.is_empty());
        assert!(notes[0].body.starts_with("Пожалуйста"));
        assert_eq!(ctl.store.get_string(keys::LANGUAGE).as_deref(), Some("rus"));
    }

    #[test]
    fn update_found_sets_link_and_notifies() {
        let info = UpdateInfo {
            latest_version: "2.3.0".into(),
            release_notes: "bugfixes".into(),
        };
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), collab(Some(info), "Linux"));
        assert_eq!(ctl.version_link(), None);
        ctl.check_for_updates();
        let outcome = ctl.wait_for_update(Duration::from_secs(5));
        assert!(matches!(outcome, Some(UpdateOutcome::Available { .. })));
        assert_eq!(
            ctl.version_link(),
            Some("https://github.com/developersu/ns-usbloader/releases/tag/2.3.0")
        );
        let notes = ctl.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(
            notes[0].body,
            "New version available: 2.3.0\n\nbugfixes"
        );
    }

    #[test]
    fn version_link_opens_only_once_found() {
        let info = UpdateInfo {
            latest_version: "2.3.0".into(),
            release_notes: String::new(),
        };
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), collab(Some(info), "Linux"));
        assert!(!ctl.open_version_link());
        assert!(OPENED.with(|o| o.borrow().is_empty()));

        ctl.check_for_updates();
        ctl.wait_for_update(Duration::from_secs(5)).unwrap();
        assert!(ctl.open_version_link());
        assert_eq!(
            OPENED.with(|o| o.borrow().clone()),
            ["https://github.com/developersu/ns-usbloader/releases/tag/2.3.0"]
        );
    }

    #[test]
    fn unknown_gl_version_is_committed_as_first_choice() {
        let mut store = full_store();
        store.set_string(keys::GL_VERSION, "v0.6");
        let ctl = session(store);
        assert_eq!(ctl.state().gl_version, GlVersion::V0_5);
        let store = ctl.commit().unwrap();
        assert_eq!(store.get_string(keys::GL_VERSION).as_deref(), Some("v0.5"));
    }

    #[test]
    fn no_update_and_unknown_are_neutral() {
        let none = UpdateInfo {
            latest_version: String::new(),
            release_notes: String::new(),
        };
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), collab(Some(none), "Linux"));
        ctl.check_for_updates();
        ctl.wait_for_update(Duration::from_secs(5)).unwrap();
        let notes = ctl.take_notifications();
        assert_eq!(notes[0].title, "No new versions available");
        assert_eq!(ctl.version_link(), None);

        let mut ctl = session(MemoryPreferenceStore::new());
        ctl.check_for_updates();
        assert_eq!(
            ctl.wait_for_update(Duration::from_secs(5)),
            Some(UpdateOutcome::Unknown)
        );
        let notes = ctl.take_notifications();
        assert_eq!(notes[0].level, NotificationLevel::Info);
        assert_eq!(notes[0].title, "Unable to check for new versions");
        assert_eq!(ctl.poll_updates(), 0);
    }

    #[test]
    fn drivers_only_on_windows() {
        let calls = Rc::new(Cell::new(0));
        let mut c = collab(None, "Linux");
        c.drivers = Box::new(Counting(calls.clone(), true));
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), c);
        assert!(!ctl.drivers_offered());
        assert!(matches!(
            ctl.install_drivers(),
            Err(DriverInstallError::Unsupported)
        ));
        assert_eq!(calls.get(), 0);

        let mut c = collab(None, "Windows 10");
        c.drivers = Box::new(Counting(calls.clone(), true));
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), c);
        assert!(ctl.drivers_offered());
        ctl.install_drivers().unwrap();
        assert_eq!(calls.get(), 1);
        assert!(ctl.take_notifications().is_empty());
    }

    #[test]
    fn failed_driver_install_notifies() {
        let mut c = collab(None, "windows");
        c.drivers = Box::new(Counting(Rc::new(Cell::new(0)), false));
        let mut ctl = SettingsController::open(MemoryPreferenceStore::new(), c);
        assert!(ctl.install_drivers().is_err());
        let notes = ctl.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
    }
}
