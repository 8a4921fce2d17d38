use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking as http;
use serde::Deserialize;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_OWNER: &str = "developersu";
const DEFAULT_REPO: &str = "ns-usbloader";

/// Raw answer of an update check.
///
/// An empty `latest_version` means the running build is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub latest_version: String,
    pub release_notes: String,
}

/// Something that can ask whether a newer release exists.
///
/// `None` means the check failed or the answer is unknown.
pub trait UpdateChecker: Send + Sync {
    fn check(&self) -> Option<UpdateInfo>;
}

/// What the user is told once a check completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    NoUpdate,
    Available { version: String, notes: String },
    Unknown,
}

impl UpdateOutcome {
    pub fn classify(result: Option<UpdateInfo>) -> Self {
        match result {
            None => UpdateOutcome::Unknown,
            Some(info) if info.latest_version.is_empty() => UpdateOutcome::NoUpdate,
            Some(info) => UpdateOutcome::Available {
                version: info.latest_version,
                notes: info.release_notes,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
}

static USER_AGENT: Lazy<String> = Lazy::new(|| {
    format!(
        "nsusbloader-settings/{ver} (+https://github.com/{DEFAULT_OWNER}/{DEFAULT_REPO})",
        ver = env!("CARGO_PKG_VERSION")
    )
});

fn http_client() -> Result<http::Client> {
    http::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT.clone())
        .build()
        .context("build http client")
}

/// Parse repo spec like "owner/repo" or a full GitHub URL.
pub fn parse_repo_spec<S: AsRef<str>>(s: S) -> Option<(String, String)> {
    let raw = s.as_ref().trim();
    if raw.is_empty() {
        return None;
    }
    let path = match raw.find("github.com/") {
        Some(p) => &raw[(p + "github.com/".len())..],
        None => raw,
    };
    let parts: Vec<&str> = path.split('/').filter(|x| !x.is_empty()).collect();
    match parts.as_slice() {
        [owner, repo] => Some((owner.to_string(), repo.to_string())),
        [owner, repo, ..] if raw.contains("github.com/") => {
            Some((owner.to_string(), repo.to_string()))
        }
        _ => None,
    }
}

/// Repository releases are published to; `NSUSBLOADER_UPDATE_REPO` overrides.
pub fn update_repo() -> (String, String) {
    std::env::var("NSUSBLOADER_UPDATE_REPO")
        .ok()
        .and_then(parse_repo_spec)
        .unwrap_or_else(|| (DEFAULT_OWNER.to_string(), DEFAULT_REPO.to_string()))
}

/// Link text shown for a found release.
pub fn release_tag_url(owner: &str, repo: &str, version: &str) -> String {
    format!("https://github.com/{}/{}/releases/tag/{}", owner, repo, version)
}

/// Compare semver-ish versions. Returns true if `latest` is newer than `current`.
pub fn is_latest_newer(current: &str, latest: &str) -> bool {
    // Strip leading v/V and whitespace
    fn parse(v: &str) -> Option<(u64, u64, u64)> {
        let v = v.trim().trim_start_matches(['v', 'V']);
        let mut it = v.split(['.', '-']);
        let major = it.next()?.parse::<u64>().ok()?;
        let minor = it.next().unwrap_or("0").parse::<u64>().unwrap_or(0);
        let patch = it.next().unwrap_or("0").parse::<u64>().unwrap_or(0);
        Some((major, minor, patch))
    }
    match (parse(current), parse(latest)) {
        (Some(c), Some(l)) => l > c,
        _ => latest.trim() != current.trim(),
    }
}

/// Checks GitHub Releases for a tag newer than the running build.
#[derive(Debug, Clone)]
pub struct GithubUpdateChecker {
    owner: String,
    repo: String,
    current_version: String,
}

impl GithubUpdateChecker {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            current_version: current_version.into(),
        }
    }

    /// Configured repository, running crate version.
    pub fn from_env() -> Self {
        let (owner, repo) = update_repo();
        Self::new(owner, repo, env!("CARGO_PKG_VERSION"))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn fetch_latest_release(&self) -> Result<ApiRelease> {
        let client = http_client()?;
        let url = format!(
            "https://api.github.com/repos/{}/{}/releases/latest",
            self.owner, self.repo
        );
        info!("[Update] Checking latest release: {}", url);
        let resp = client
            .get(&url)
            .send()
            .with_context(|| format!("request latest release: {}", url))?;
        if !resp.status().is_success() {
            return Err(anyhow!("GitHub API status: {}", resp.status()));
        }
        resp.json().context("parse GitHub JSON")
    }
}

impl UpdateChecker for GithubUpdateChecker {
    fn check(&self) -> Option<UpdateInfo> {
        let rel = match self.fetch_latest_release() {
            Ok(rel) => rel,
            Err(e) => {
                warn!("[Update] Update check failed: {:#}", e);
                return None;
            }
        };
        let notes = rel.body.unwrap_or_default();
        if is_latest_newer(&self.current_version, &rel.tag_name) {
            info!("[Update] New version available: {}", rel.tag_name);
            Some(UpdateInfo {
                latest_version: rel.tag_name,
                release_notes: notes,
            })
        } else {
            info!(
                "[Update] Up-to-date. current={} latest={}",
                self.current_version, rel.tag_name
            );
            Some(UpdateInfo {
                latest_version: String::new(),
                release_notes: notes,
            })
        }
    }
}

/// Run `checker` on a detached background thread and send the outcome to `tx`.
///
/// The thread is never joined and cannot be cancelled. Nothing stops a second
/// check from running alongside the first; a duplicate request is harmless.
pub fn spawn_update_check(
    checker: Arc<dyn UpdateChecker>,
    tx: Sender<UpdateOutcome>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("update-check".into())
        .spawn(move || {
            let outcome = UpdateOutcome::classify(checker.check());
            // Receiver gone means the settings session already closed
            let _ = tx.send(outcome);
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct Fixed(Option<UpdateInfo>);

    impl UpdateChecker for Fixed {
        fn check(&self) -> Option<UpdateInfo> {
            self.0.clone()
        }
    }

    #[test]
    fn classification() {
        assert_eq!(UpdateOutcome::classify(None), UpdateOutcome::Unknown);
        assert_eq!(
            UpdateOutcome::classify(Some(UpdateInfo {
                latest_version: String::new(),
                release_notes: "whatever".into(),
            })),
            UpdateOutcome::NoUpdate
        );
        assert_eq!(
            UpdateOutcome::classify(Some(UpdateInfo {
                latest_version: "2.3.0".into(),
                release_notes: "bugfixes".into(),
            })),
            UpdateOutcome::Available {
                version: "2.3.0".into(),
                notes: "bugfixes".into()
            }
        );
    }

    #[test]
    fn version_comparison() {
        assert!(is_latest_newer("0.1.0", "v0.2.0"));
        assert!(is_latest_newer("2.2.9", "2.3.0"));
        assert!(!is_latest_newer("2.3.0", "v2.3.0"));
        assert!(!is_latest_newer("2.3.0", "2.2"));
        assert!(is_latest_newer("1.0", "nightly"));
    }

    #[test]
    fn repo_spec_forms() {
        assert_eq!(
            parse_repo_spec("developersu/ns-usbloader"),
            Some(("developersu".into(), "ns-usbloader".into()))
        );
        assert_eq!(
            parse_repo_spec("https://github.com/owner/repo/releases"),
            Some(("owner".into(), "repo".into()))
        );
        assert_eq!(parse_repo_spec("just-a-name"), None);
        assert_eq!(parse_repo_spec("a/b/c"), None);
        assert_eq!(parse_repo_spec("  "), None);
    }

    #[test]
    fn release_json_without_body() {
        let rel: ApiRelease = serde_json::from_str(
            r#"{"tag_name": "v1.2.0", "draft": false, "assets": []}"#,
        )
        .unwrap();
        assert_eq!(rel.tag_name, "v1.2.0");
        assert_eq!(rel.body, None);

        let rel: ApiRelease =
            serde_json::from_str(r#"{"tag_name": "1.3", "body": "- fixes"}"#).unwrap();
        assert_eq!(rel.body.as_deref(), Some("- fixes"));
    }

    #[test]
    fn tag_link_text() {
        assert_eq!(
            release_tag_url("developersu", "ns-usbloader", "2.3.0"),
            "https://github.com/developersu/ns-usbloader/releases/tag/2.3.0"
        );
    }

    #[test]
    fn worker_delivers_outcome() {
        let (tx, rx) = mpsc::channel();
        let checker = Arc::new(Fixed(Some(UpdateInfo {
            latest_version: "9.9.9".into(),
            release_notes: "notes".into(),
        })));
        spawn_update_check(checker, tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Available { ref version, .. } if version == "9.9.9"));
    }
}
