use std::{
    fs, io,
    path::{Path, PathBuf},
};

use deckhand_acquire::{
    FetchConfig, FetchStrategy, DEFAULT_ARCHIVE_NAME, DEFAULT_DOWNLOAD_BASE,
    DEFAULT_HELPER_PROGRAM,
};
use deckhand_supervisor::{RespawnPolicy, ServiceDescriptor, DEFAULT_PATTERN};
use deckhand_util::{expand_user, parse_flag, read_env_trimmed, state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.json";

pub(crate) const DEFAULT_PACKAGES: [&str; 7] = [
    "flask",
    "requests",
    "beautifulsoup4",
    "pytz",
    "jdatetime",
    "urllib3",
    "gdown",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) project_dir: PathBuf,
    pub(crate) entry_file: String,
    pub(crate) interpreter: PathBuf,
    pub(crate) service_name: String,
    pub(crate) init_script: PathBuf,
    pub(crate) log_file: PathBuf,
    /// Empty means "use `project_dir`".
    pub(crate) staging_dir: Option<PathBuf>,
    pub(crate) archive_name: String,
    pub(crate) fetch_strategy: String,
    pub(crate) download_base: String,
    pub(crate) confirm_bypass: bool,
    pub(crate) helper_program: String,
    pub(crate) process_pattern: String,
    pub(crate) respawn: RespawnPolicy,
    pub(crate) packages: Vec<String>,
    pub(crate) index_update: Vec<String>,
    pub(crate) pip_program: String,
    pub(crate) pip_timeout_secs: u32,
    pub(crate) pip_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("/last"),
            entry_file: "app.py".into(),
            interpreter: PathBuf::from("/usr/bin/python3"),
            service_name: "minerpanel".into(),
            init_script: PathBuf::from("/etc/init.d/minerpanel"),
            log_file: PathBuf::from("/tmp/minerpanel.log"),
            staging_dir: None,
            archive_name: DEFAULT_ARCHIVE_NAME.into(),
            fetch_strategy: FetchStrategy::default().as_str().into(),
            download_base: DEFAULT_DOWNLOAD_BASE.into(),
            confirm_bypass: true,
            helper_program: DEFAULT_HELPER_PROGRAM.into(),
            process_pattern: DEFAULT_PATTERN.into(),
            respawn: RespawnPolicy::default(),
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            index_update: vec!["opkg".into(), "update".into()],
            pip_program: "pip3".into(),
            pip_timeout_secs: 120,
            pip_retries: 10,
        }
    }
}

impl AppConfig {
    /// Defaults, then the state file, then `DECKHAND_*` variables.
    pub(crate) fn load() -> Self {
        let path = config_path();
        let mut cfg = match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => file_cfg,
                Err(err) => {
                    eprintln!("Failed to parse {}: {err}", path.display());
                    AppConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    eprintln!("Failed to read {}: {err}", path.display());
                }
                AppConfig::default()
            }
        };
        cfg.apply_env(read_env_trimmed);
        cfg
    }

    pub(crate) fn save(&self) -> io::Result<()> {
        write_json_atomic(&config_path(), self)
    }

    pub(crate) fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let path = |key: &str| lookup(key).map(|value| expand_user(&value));
        if let Some(value) = path("DECKHAND_PROJECT_DIR") {
            self.project_dir = value;
        }
        if let Some(value) = lookup("DECKHAND_ENTRY_FILE") {
            self.entry_file = value;
        }
        if let Some(value) = path("DECKHAND_INTERPRETER") {
            self.interpreter = value;
        }
        if let Some(value) = lookup("DECKHAND_SERVICE_NAME") {
            self.service_name = value;
        }
        if let Some(value) = path("DECKHAND_INIT_SCRIPT") {
            self.init_script = value;
        }
        if let Some(value) = path("DECKHAND_LOG_FILE") {
            self.log_file = value;
        }
        if let Some(value) = path("DECKHAND_STAGING_DIR") {
            self.staging_dir = Some(value);
        }
        if let Some(value) = lookup("DECKHAND_ARCHIVE_NAME") {
            self.archive_name = value;
        }
        if let Some(value) = lookup("DECKHAND_FETCH_STRATEGY") {
            self.fetch_strategy = value;
        }
        if let Some(value) = lookup("DECKHAND_DOWNLOAD_BASE") {
            self.download_base = value;
        }
        if let Some(value) = lookup("DECKHAND_CONFIRM_BYPASS") {
            self.confirm_bypass = parse_flag(&value);
        }
        if let Some(value) = lookup("DECKHAND_HELPER") {
            self.helper_program = value;
        }
        if let Some(value) = lookup("DECKHAND_PROCESS_PATTERN") {
            self.process_pattern = value;
        }
        if let Some(value) = lookup("DECKHAND_PACKAGES") {
            self.packages = value
                .split(',')
                .map(str::trim)
                .filter(|pkg| !pkg.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub(crate) fn entry_point(&self) -> PathBuf {
        self.project_dir.join(&self.entry_file)
    }

    pub(crate) fn staging_dir(&self) -> &Path {
        self.staging_dir.as_deref().unwrap_or(&self.project_dir)
    }

    pub(crate) fn fetch_config(&self) -> Result<FetchConfig, String> {
        Ok(FetchConfig {
            strategy: self.fetch_strategy.parse()?,
            base_url: self.download_base.clone(),
            confirm_bypass: self.confirm_bypass,
            helper_program: self.helper_program.clone(),
        })
    }

    pub(crate) fn descriptor(&self) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new(
            &self.service_name,
            &self.interpreter,
            self.entry_point(),
            &self.log_file,
        );
        descriptor.respawn = self.respawn;
        descriptor
    }
}

pub(crate) fn config_path() -> PathBuf {
    state_file_path(CONFIG_FILE)
}
