use std::{io, path::PathBuf};

use deckhand_util::{find_command, run_command, CommandOutput};

use crate::config::AppConfig;

/// Runtime dependency installation through the device package tools.
#[derive(Clone, Debug)]
pub(crate) struct PackageInstaller {
    index_update: Vec<String>,
    pip_program: String,
    timeout_secs: u32,
    retries: u32,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct InstallSummary {
    pub(crate) index_updated: bool,
    pub(crate) results: Vec<PackageResult>,
}

#[derive(Clone, Debug)]
pub(crate) struct PackageResult {
    pub(crate) package: String,
    pub(crate) ok: bool,
    pub(crate) detail: String,
}

impl InstallSummary {
    pub(crate) fn failed(&self) -> impl Iterator<Item = &PackageResult> {
        self.results.iter().filter(|r| !r.ok)
    }
}

impl PackageInstaller {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            index_update: config.index_update.clone(),
            pip_program: config.pip_program.clone(),
            timeout_secs: config.pip_timeout_secs,
            retries: config.pip_retries,
        }
    }

    pub(crate) fn pip_args(&self, package: &str) -> Vec<String> {
        vec![
            "install".into(),
            "--no-cache-dir".into(),
            "--timeout".into(),
            self.timeout_secs.to_string(),
            "--retries".into(),
            self.retries.to_string(),
            package.into(),
        ]
    }

    /// Refreshes the package index, then installs each package in turn.
    ///
    /// Every step runs even if an earlier one failed; `on_step` sees each
    /// result as it lands.
    pub(crate) async fn install(
        &self,
        packages: &[String],
        mut on_step: impl FnMut(&str, bool),
    ) -> InstallSummary {
        let mut summary = InstallSummary::default();

        if let Some((program, args)) = self.index_update.split_first() {
            let label = self.index_update.join(" ");
            let (ok, _) = step(run_command(program, args).await);
            on_step(&label, ok);
            summary.index_updated = ok;
        }

        for package in packages {
            let (ok, detail) = step(run_command(&self.pip_program, self.pip_args(package)).await);
            if !ok {
                tracing::warn!("installing {package} failed: {detail}");
            }
            on_step(package, ok);
            summary.results.push(PackageResult {
                package: package.clone(),
                ok,
                detail,
            });
        }
        summary
    }
}

fn step(result: io::Result<CommandOutput>) -> (bool, String) {
    match result {
        Ok(output) => (output.success, output.combined()),
        Err(err) => (false, err.to_string()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Interpreter {
    pub(crate) path: PathBuf,
    pub(crate) version: String,
}

/// First of `python3`, `python` on `PATH`, with its reported version.
pub(crate) async fn detect_interpreter() -> Option<Interpreter> {
    for candidate in ["python3", "python"] {
        let Some(path) = find_command(candidate) else {
            continue;
        };
        let version = match run_command(&path, ["--version"]).await {
            Ok(output) => output.combined().trim().to_string(),
            Err(err) => {
                tracing::debug!("{} --version failed: {err}", path.display());
                String::new()
            }
        };
        return Some(Interpreter { path, version });
    }
    None
}
