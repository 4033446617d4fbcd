//! Opt-in local telemetry for the operator console.
//!
//! Nothing leaves the device: usage events and crash reports are appended as
//! JSON lines under the data directory. Both streams stay off unless the
//! matching environment flag is set.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, SyncSender},
        Arc, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

const QUEUE_DEPTH: usize = 32;
const ROTATE_AT_BYTES: u64 = 256 * 1024;
const EVENTS_FILE: &str = "events.jsonl";
const CRASHES_FILE: &str = "crashes.jsonl";

#[derive(Clone, Debug)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub usage_enabled: bool,
    pub crash_enabled: bool,
    pub root: PathBuf,
}

pub struct Telemetry {
    app: &'static str,
    version: &'static str,
    session: String,
    root: PathBuf,
    usage: AtomicBool,
    crashes: AtomicBool,
    queue: SyncSender<Record>,
}

/// One line of `events.jsonl` or `crashes.jsonl`.
#[derive(Debug, Serialize)]
struct Record {
    kind: &'static str,
    name: String,
    ts_ms: i64,
    app: &'static str,
    version: &'static str,
    session: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    props: BTreeMap<String, String>,
}

static GLOBAL: OnceLock<Arc<Telemetry>> = OnceLock::new();

/// Installs the process-wide sink. A second call only updates the flags.
pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(current) = GLOBAL.get() {
        current.usage.store(options.usage_enabled, Ordering::Relaxed);
        current
            .crashes
            .store(options.crash_enabled, Ordering::Relaxed);
        return Arc::clone(current);
    }

    let (queue, rx) = sync_channel(QUEUE_DEPTH);
    let telemetry = Arc::new(Telemetry {
        app: options.app_name,
        version: options.app_version,
        session: format!("{:x}-{:x}", now_ms(), std::process::id()),
        root: options.root,
        usage: AtomicBool::new(options.usage_enabled),
        crashes: AtomicBool::new(options.crash_enabled),
        queue,
    });
    spawn_writer(telemetry.events_path(), rx);
    hook_panics(Arc::clone(&telemetry));

    let _ = GLOBAL.set(Arc::clone(&telemetry));
    telemetry
}

/// Reads `DECKHAND_TELEMETRY` and `DECKHAND_TELEMETRY_CRASH`.
pub fn init_with_env(app_name: &'static str, app_version: &'static str) -> Arc<Telemetry> {
    init(TelemetryOptions {
        app_name,
        app_version,
        usage_enabled: flag_set("DECKHAND_TELEMETRY"),
        crash_enabled: flag_set("DECKHAND_TELEMETRY_CRASH"),
        root: default_root(),
    })
}

/// Records a usage event; a no-op before `init` or while usage is off.
pub fn event(name: &str, props: &[(&str, &str)]) {
    if let Some(telemetry) = GLOBAL.get() {
        telemetry.event(name, props);
    }
}

impl Telemetry {
    pub fn events_path(&self) -> PathBuf {
        self.root.join(EVENTS_FILE)
    }

    pub fn crashes_path(&self) -> PathBuf {
        self.root.join(CRASHES_FILE)
    }

    fn event(&self, name: &str, props: &[(&str, &str)]) {
        if self.usage.load(Ordering::Relaxed) {
            // Dropped rather than blocking the menu when the writer lags.
            let _ = self.queue.try_send(self.record("usage", name, props));
        }
    }

    fn record(&self, kind: &'static str, name: &str, props: &[(&str, &str)]) -> Record {
        Record {
            kind,
            name: name.to_string(),
            ts_ms: now_ms(),
            app: self.app,
            version: self.version,
            session: self.session.clone(),
            props: props
                .iter()
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Written synchronously: the process may be about to die.
    fn crash(&self, message: &str, location: Option<String>) {
        if !self.crashes.load(Ordering::Relaxed) {
            return;
        }
        let location = location.unwrap_or_default();
        let record = self.record("crash", message, &[("location", location.as_str())]);
        let _ = append_line(&self.crashes_path(), &record, ROTATE_AT_BYTES);
    }
}

fn spawn_writer(path: PathBuf, rx: Receiver<Record>) {
    std::thread::spawn(move || {
        for record in rx {
            if let Err(err) = append_line(&path, &record, ROTATE_AT_BYTES) {
                eprintln!("telemetry: cannot write {}: {err}", path.display());
            }
        }
    });
}

fn hook_panics(telemetry: Arc<Telemetry>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = match (payload.downcast_ref::<&str>(), payload.downcast_ref::<String>()) {
            (Some(text), _) => text.to_string(),
            (None, Some(text)) => text.clone(),
            (None, None) => "panic".to_string(),
        };
        let location = info
            .location()
            .map(|at| format!("{}:{}", at.file(), at.line()));
        telemetry.crash(&message, location);
        previous(info);
    }));
}

fn append_line(path: &Path, record: &Record, rotate_at: u64) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    rotate(path, rotate_at)?;
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(&line)
}

/// Keeps a single previous generation as `<file>.1`.
fn rotate(path: &Path, rotate_at: u64) -> io::Result<()> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if size < rotate_at {
        return Ok(());
    }
    let mut previous = path.as_os_str().to_owned();
    previous.push(".1");
    fs::rename(path, previous)
}

fn default_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".local/share"))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("deckhand/telemetry")
}

fn flag_set(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> Record {
        Record {
            kind: "usage",
            name: name.to_string(),
            ts_ms: 1,
            app: "deckhand",
            version: "0.1.0",
            session: "s".into(),
            props: BTreeMap::from([("stage".to_string(), "fetch".to_string())]),
        }
    }

    #[test]
    fn appends_one_json_line_per_record() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join(EVENTS_FILE);
        append_line(&path, &record("acquire.completed"), ROTATE_AT_BYTES)?;
        append_line(&path, &record("service.created"), ROTATE_AT_BYTES)?;

        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).map_err(io::Error::other)?;
        assert_eq!(first["name"], "acquire.completed");
        assert_eq!(first["props"]["stage"], "fetch");
        Ok(())
    }

    #[test]
    fn oversized_file_rotates_before_append() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(EVENTS_FILE);
        fs::write(&path, vec![b'x'; 32])?;

        append_line(&path, &record("app.start"), 16)?;
        assert_eq!(fs::read(dir.path().join("events.jsonl.1"))?.len(), 32);
        assert!(fs::read_to_string(&path)?.contains("app.start"));
        Ok(())
    }

    #[test]
    fn rotation_ignores_missing_file() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        rotate(&dir.path().join(EVENTS_FILE), 1)
    }
}
