//! Application instances and the process-wide registry of them.

use crate::errors::{QueryError, QueryResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Name under which the default app is registered.
pub const DEFAULT_APP_NAME: &str = "__QUERYLITE_DEFAULT";

/// Files searched, in order, by [`AppOptions::load_from_dir`].
pub const OPTIONS_FILE_NAMES: [&str; 2] = ["querylite-desktop.json", "querylite.json"];

/// Option files larger than this are rejected.
pub const MAX_OPTIONS_FILE_BYTES: u64 = 500 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    pub project_id: String,
    pub app_id: String,
    pub api_key: String,
    pub database_url: Option<String>,
    pub storage_bucket: Option<String>,
}

#[derive(Deserialize)]
struct ProjectInfo {
    project_id: String,
    #[serde(default)]
    firebase_url: Option<String>,
    #[serde(default)]
    storage_bucket: Option<String>,
}

impl AppOptions {
    /// Parses options from JSON. Accepts the flat field layout of this type,
    /// or a services file whose `project_info` object carries the project.
    ///
    /// # Errors
    /// `Json` for malformed input, `Config` when no project id is present.
    pub fn from_json_str(text: &str) -> QueryResult<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let options = if let Some(info) = raw.get("project_info") {
            let info: ProjectInfo = serde_json::from_value(info.clone())?;
            let app_id = raw
                .pointer("/client/0/client_info/mobilesdk_app_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let api_key = raw
                .pointer("/client/0/api_key/0/current_key")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            Self {
                project_id: info.project_id,
                app_id,
                api_key,
                database_url: info.firebase_url,
                storage_bucket: info.storage_bucket,
            }
        } else {
            serde_json::from_value(raw)?
        };
        if options.project_id.is_empty() {
            return Err(QueryError::Config("options carry no project_id".into()));
        }
        Ok(options)
    }

    /// # Errors
    /// `Config` if the file exceeds [`MAX_OPTIONS_FILE_BYTES`], I/O errors, and
    /// everything [`Self::from_json_str`] reports.
    pub fn load(path: &Path) -> QueryResult<Self> {
        let len = std::fs::metadata(path)?.len();
        if len > MAX_OPTIONS_FILE_BYTES {
            return Err(QueryError::Config(format!(
                "{} is {len} bytes; limit is {MAX_OPTIONS_FILE_BYTES}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Loads the first of [`OPTIONS_FILE_NAMES`] in `dir` that parses.
    pub fn load_from_dir(dir: &Path) -> QueryResult<Self> {
        let mut tried = Vec::new();
        for name in OPTIONS_FILE_NAMES {
            let path = dir.join(name);
            match Self::load(&path) {
                Ok(options) => return Ok(options),
                Err(e) => {
                    log::debug!("skipping {}: {e}", path.display());
                    tried.push(path.display().to_string());
                }
            }
        }
        Err(QueryError::Config(format!(
            "unable to load app options ([{}] are missing or malformed)",
            tried.join(", ")
        )))
    }
}

/// A named application instance. Immutable once created.
#[derive(Debug)]
pub struct App {
    name: String,
    options: AppOptions,
}

impl App {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_APP_NAME
    }
}

/// Named apps plus the libraries that registered themselves for the user agent.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: RwLock<BTreeMap<String, Arc<App>>>,
    libraries: RwLock<BTreeMap<String, String>>,
}

static GLOBAL: LazyLock<AppRegistry> = LazyLock::new(AppRegistry::default);

impl AppRegistry {
    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static AppRegistry {
        &GLOBAL
    }

    /// Creates an app under `name`. If one already exists it is returned
    /// unchanged and `options` are not applied.
    pub fn create(&self, options: AppOptions, name: &str) -> Arc<App> {
        let mut apps = self.apps.write();
        if let Some(existing) = apps.get(name) {
            log::error!("app {name} already created, options will not be applied");
            return Arc::clone(existing);
        }
        let app = Arc::new(App { name: name.to_string(), options });
        log::info!("initializing app {name} (default {})", app.is_default());
        apps.insert(name.to_string(), Arc::clone(&app));
        app
    }

    pub fn add_default(&self, options: AppOptions) -> Arc<App> {
        self.create(options, DEFAULT_APP_NAME)
    }

    /// Creates the default app from option files in `dir`.
    ///
    pub fn add_default_from_dir(&self, dir: &Path) -> QueryResult<Arc<App>> {
        let options = AppOptions::load_from_dir(dir).inspect_err(|e| log::error!("{e}"))?;
        Ok(self.add_default(options))
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<App>> {
        self.apps.read().get(name).cloned()
    }

    pub fn default_app(&self) -> QueryResult<Arc<App>> {
        self.find_by_name(DEFAULT_APP_NAME).ok_or_else(|| QueryError::NoSuchApp(DEFAULT_APP_NAME.into()))
    }

    /// Unregisters `name`. Existing handles stay usable.
    pub fn remove(&self, name: &str) -> Option<Arc<App>> {
        self.apps.write().remove(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.apps.read().keys().cloned().collect()
    }

    /// Records `library/version` for the user agent. Re-registering a library
    /// replaces its version.
    pub fn register_library(&self, library: &str, version: &str) {
        if library.is_empty() || library.contains(['/', ' ']) || version.contains(' ') {
            log::warn!("ignoring malformed library registration '{library}/{version}'");
            return;
        }
        self.libraries.write().insert(library.to_string(), version.to_string());
    }

    /// Space-separated `library/version` pairs, sorted by library.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let libs = self.libraries.read();
        let mut parts = vec![format!("querylite/{}", env!("CARGO_PKG_VERSION"))];
        parts.extend(libs.iter().filter(|(k, _)| k.as_str() != "querylite").map(|(k, v)| format!("{k}/{v}")));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(project: &str) -> AppOptions {
        AppOptions { project_id: project.into(), ..AppOptions::default() }
    }

    #[test]
    fn create_is_idempotent_per_name() {
        let reg = AppRegistry::default();
        let a = reg.create(options("one"), "a");
        let again = reg.create(options("two"), "a");
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.options().project_id, "one");
        assert!(reg.find_by_name("b").is_none());
    }

    #[test]
    fn default_app_lookup() {
        let reg = AppRegistry::default();
        assert!(matches!(reg.default_app(), Err(QueryError::NoSuchApp(_))));
        let app = reg.add_default(options("p"));
        assert!(app.is_default());
        assert!(Arc::ptr_eq(&reg.default_app().unwrap(), &app));
        assert!(reg.remove(DEFAULT_APP_NAME).is_some());
        assert!(reg.default_app().is_err());
    }

    #[test]
    fn options_from_services_layout() {
        let json = r#"{
            "project_info": {"project_id": "demo", "storage_bucket": "demo.appspot.com"},
            "client": [{"client_info": {"mobilesdk_app_id": "1:2:web:3"},
                        "api_key": [{"current_key": "k"}]}]
        }"#;
        let o = AppOptions::from_json_str(json).unwrap();
        assert_eq!(o.project_id, "demo");
        assert_eq!(o.app_id, "1:2:web:3");
        assert_eq!(o.api_key, "k");
        assert_eq!(o.storage_bucket.as_deref(), Some("demo.appspot.com"));
    }

    #[test]
    fn load_from_dir_prefers_desktop_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("querylite.json"), r#"{"project_id":"plain"}"#).unwrap();
        assert_eq!(AppOptions::load_from_dir(dir.path()).unwrap().project_id, "plain");
        std::fs::write(dir.path().join("querylite-desktop.json"), r#"{"project_id":"desk"}"#).unwrap();
        assert_eq!(AppOptions::load_from_dir(dir.path()).unwrap().project_id, "desk");
    }

    #[test]
    fn load_rejects_missing_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(AppOptions::load_from_dir(dir.path()), Err(QueryError::Config(_))));
        let big = format!(r#"{{"project_id":"x","api_key":"{}"}}"#, "a".repeat(600 * 1024));
        let path = dir.path().join("querylite.json");
        std::fs::write(&path, big).unwrap();
        assert!(matches!(AppOptions::load(&path), Err(QueryError::Config(_))));
    }

    #[test]
    fn user_agent_lists_registered_libraries() {
        let reg = AppRegistry::default();
        reg.register_library("zeta", "2.0");
        reg.register_library("alpha", "1.0");
        reg.register_library("bad name", "1");
        let ua = reg.user_agent();
        assert!(ua.starts_with("querylite/"));
        assert!(ua.ends_with("alpha/1.0 zeta/2.0"));
        assert!(!ua.contains("bad"));
    }
}
