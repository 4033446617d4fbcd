use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Keeps Python from block-buffering stdout so the log is current.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

/// procd's `respawn <threshold> <timeout> <retry>` triple.
///
/// A process that dies `retry` times, each within `threshold_secs` of being
/// started, is given up on; `timeout_secs` is the pause before each restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnPolicy {
    pub threshold_secs: u32,
    pub timeout_secs: u32,
    pub retry: u32,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            threshold_secs: 3600,
            timeout_secs: 5,
            retry: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub interpreter: PathBuf,
    pub entry_point: PathBuf,
    pub working_dir: PathBuf,
    pub log_file: PathBuf,
    pub start_priority: u8,
    pub stop_priority: u8,
    pub respawn: RespawnPolicy,
    pub env: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        interpreter: impl Into<PathBuf>,
        entry_point: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        let entry_point = entry_point.into();
        let working_dir = entry_point
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self {
            name: name.into(),
            interpreter: interpreter.into(),
            entry_point,
            working_dir,
            log_file: log_file.into(),
            start_priority: 95,
            stop_priority: 10,
            respawn: RespawnPolicy::default(),
            env: BTreeMap::from([(UNBUFFERED_ENV.0.to_string(), UNBUFFERED_ENV.1.to_string())]),
        }
    }

    /// Substring used to find the managed process in the process table.
    pub fn process_pattern(&self) -> String {
        self.entry_point
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.entry_point.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_working_dir_and_defaults() {
        let descriptor = ServiceDescriptor::new(
            "minerpanel",
            "/usr/bin/python3",
            "/last/app.py",
            "/tmp/minerpanel.log",
        );
        assert_eq!(descriptor.working_dir, PathBuf::from("/last"));
        assert_eq!(descriptor.start_priority, 95);
        assert_eq!(descriptor.stop_priority, 10);
        assert_eq!(descriptor.respawn, RespawnPolicy::default());
        assert_eq!(
            descriptor.env.get("PYTHONUNBUFFERED").map(String::as_str),
            Some("1")
        );
        assert_eq!(descriptor.process_pattern(), "app.py");
    }
}
