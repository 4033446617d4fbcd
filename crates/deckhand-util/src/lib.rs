use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    process::Stdio,
};

use deckhand_telemetry as telemetry;
use serde::Serialize;
use tokio::process::Command;

pub const APP_DIR_NAME: &str = "deckhand";

pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share").join(APP_DIR_NAME)
    } else {
        PathBuf::from("/tmp").join(APP_DIR_NAME)
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads an environment variable, ignoring it when blank.
pub fn read_env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Truthy spellings accepted for boolean settings.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Interprets an operator's answer to a yes-by-default question.
///
/// Blank input means yes; only an explicit `n`/`no` opts out.
pub fn parse_confirmation(answer: &str) -> bool {
    !matches!(answer.trim().to_ascii_lowercase().as_str(), "n" | "no")
}

pub fn find_command(cmd: &str) -> Option<PathBuf> {
    if cmd.contains('/') {
        let path = PathBuf::from(cmd);
        return path.is_file().then_some(path);
    }

    let mut candidates = Vec::new();
    if let Some(paths) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&paths));
    }
    candidates.extend([
        PathBuf::from("/usr/bin"),
        PathBuf::from("/bin"),
        PathBuf::from("/usr/sbin"),
        PathBuf::from("/sbin"),
    ]);

    candidates
        .into_iter()
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

/// Captured result of an external command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout and stderr merged into one operator-facing block.
    pub fn combined(&self) -> String {
        format_command_output(&self.stdout, &self.stderr)
    }
}

pub async fn run_command<I, S>(program: impl AsRef<OsStr>, args: I) -> io::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    tracing::debug!("running {}", program.as_ref().to_string_lossy());
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    let output = cmd.output().await?;

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

pub fn format_command_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str(stderr);
        out.push('\n');
    }

    out
}

/// Installs the fmt subscriber; `RUST_LOG` overrides `default_directive`.
pub fn init_tracing(default_directive: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new(default_directive),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

pub fn init_app_telemetry(app_name: &'static str, app_version: &'static str) {
    telemetry::init_with_env(app_name, app_version);
    telemetry::event("app.start", &[("version", app_version)]);
}
