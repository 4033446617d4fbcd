use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use deckhand_acquire::{
    build_fetcher, resolve, AcquireError, CleanupOutcome, DownloadRequest, ExtractionResult,
    Pipeline, EXAMPLE_INPUTS, SHARING_HINT,
};
use deckhand_supervisor::{
    ControlAction, ControlReport, InitScript, ProcessInspector, ProcessTable, ProcfsTable,
    ServiceStatus, Supervisor,
};
use deckhand_telemetry as telemetry;
use deckhand_util::{parse_confirmation, CommandOutput};

use crate::{
    config::{config_path, AppConfig},
    console::Console,
    packages::{detect_interpreter, PackageInstaller},
};

const MAIN_MENU: &str = "\
  1) Acquire project archive
  2) Install dependencies
  3) Create service
  4) Manage service
  5) List / kill processes
  6) Remove service
  7) Settings
  0) Exit";

const SERVICE_MENU: &str = "\
  1) Start
  2) Stop
  3) Restart
  4) Status
  0) Back";

pub(crate) struct App<R, W> {
    config: AppConfig,
    console: Console<R, W>,
    pipeline: Pipeline,
    supervisor: Supervisor,
    inspector: ProcessInspector,
    installer: PackageInstaller,
}

impl<R: BufRead, W: Write> App<R, W> {
    pub(crate) fn new(config: AppConfig, console: Console<R, W>) -> Result<Self, String> {
        let fetch = config.fetch_config()?;
        let table: Arc<dyn ProcessTable> = Arc::new(ProcfsTable::default());
        let supervisor = Supervisor::new(
            config.descriptor(),
            &config.init_script,
            Box::new(InitScript::new(&config.init_script)),
            Arc::clone(&table),
        );
        Ok(Self {
            pipeline: Pipeline::new(build_fetcher(&fetch)),
            inspector: ProcessInspector::new(table),
            installer: PackageInstaller::from_config(&config),
            supervisor,
            console,
            config,
        })
    }

    /// Main loop; returns when the operator picks exit or input ends.
    pub(crate) async fn run(&mut self) -> io::Result<()> {
        self.banner().await;
        loop {
            self.console.say("");
            self.console.say(MAIN_MENU);
            let Some(choice) = self.console.prompt("Select:")? else {
                return Ok(());
            };
            match choice.as_str() {
                "1" => self.acquire().await?,
                "2" => self.install_dependencies().await?,
                "3" => self.create_service().await?,
                "4" => self.manage_service().await?,
                "5" => self.inspect_processes()?,
                "6" => self.remove_service().await?,
                "7" => self.show_settings()?,
                "0" => {
                    self.console.say("Bye.");
                    return Ok(());
                }
                "" => {}
                other => self.console.say(format!("Unknown option {other:?}")),
            }
        }
    }

    async fn banner(&mut self) {
        self.console
            .say(format!("deckhand {}", env!("CARGO_PKG_VERSION")));
        match detect_interpreter().await {
            Some(found) => self.console.say(format!(
                "Interpreter: {} ({})",
                found.version,
                found.path.display()
            )),
            None => self
                .console
                .say("Interpreter: none found on PATH (python3, python)"),
        }
        let entry = self.config.entry_point();
        self.console.say(format!(
            "Project: {} [{}]",
            entry.display(),
            if entry.is_file() { "present" } else { "missing" }
        ));
    }

    async fn acquire(&mut self) -> io::Result<()> {
        let Some(input) = self.console.prompt("Share link or file id:")? else {
            return Ok(());
        };
        let identifier = match resolve(&input) {
            Ok(identifier) => identifier,
            Err(err) => {
                self.console.say(format!("Error: {err}"));
                self.console.say("Accepted formats, for example:");
                for example in EXAMPLE_INPUTS {
                    self.console.say(format!("  {example}"));
                }
                return Ok(());
            }
        };
        self.console.say(format!("File id: {identifier}"));

        let staging = self.config.staging_dir().to_path_buf();
        let mut request = DownloadRequest::new(identifier, &staging);
        request.archive_name = self.config.archive_name.clone();
        let label = format!("Extract to [{}]:", staging.display());
        if let Some(dir) = self.console.prompt(&label)?.filter(|d| !d.is_empty()) {
            request = request.with_extract_dir(deckhand_util::expand_user(&dir));
        }

        self.console.say(format!(
            "Downloading with {} into {} ...",
            self.pipeline.fetcher_name(),
            request.archive_path().display()
        ));
        match self.pipeline.acquire(&request, &mut self.console).await {
            Ok(result) => {
                self.report_acquired(&result);
                let entries = result.entries.unwrap_or(0).to_string();
                telemetry::event(
                    "acquire.completed",
                    &[
                        ("entries", entries.as_str()),
                        ("fetcher", self.pipeline.fetcher_name()),
                    ],
                );
            }
            Err(err) => {
                self.report_acquire_error(&err);
                telemetry::event("acquire.failed", &[("stage", err.stage())]);
            }
        }
        Ok(())
    }

    fn report_acquired(&mut self, result: &ExtractionResult) {
        self.console.say(format!(
            "Downloaded {} ({:.2} MB)",
            result.archive_path.display(),
            result.archive_megabytes()
        ));
        if let Some(digest) = &result.sha256 {
            self.console.say(format!("SHA-256: {digest}"));
        }
        match (result.entries, &result.extract_dir) {
            (Some(count), Some(dir)) => self
                .console
                .say(format!("Extracted {count} entries into {}", dir.display())),
            _ => self.console.say(format!(
                "Warning: {} is not a recognized archive, left in place",
                result.archive_path.display()
            )),
        }
        match &result.cleanup {
            CleanupOutcome::Removed => self.console.say("Archive removed."),
            CleanupOutcome::Kept => self.console.say("Archive kept."),
            CleanupOutcome::Failed(reason) => self
                .console
                .say(format!("Warning: could not remove archive: {reason}")),
            CleanupOutcome::NotApplicable => {}
        }
    }

    fn report_acquire_error(&mut self, err: &AcquireError) {
        self.console.say(format!("Error: {err}"));
        match err {
            AcquireError::Fetch { .. } => self.console.say(format!("Hint: {SHARING_HINT}")),
            AcquireError::Extract { archive, source } => {
                self.console.say(format!("Cause: {source}"));
                self.console
                    .say(format!("Archive kept at {} for inspection", archive.display()));
            }
            AcquireError::Io { source, .. } => self.console.say(format!("Cause: {source}")),
        }
    }

    async fn install_dependencies(&mut self) -> io::Result<()> {
        let packages = self.config.packages.clone();
        self.console
            .say(format!("Installing {} packages...", packages.len()));
        let console = &mut self.console;
        let summary = self
            .installer
            .install(&packages, |label, ok| {
                console.say(format!("  [{}] {label}", if ok { "ok" } else { "FAILED" }));
            })
            .await;

        let failed: Vec<&str> = summary.failed().map(|r| r.package.as_str()).collect();
        if !summary.index_updated {
            self.console.say("Warning: package index update failed");
        }
        if failed.is_empty() {
            self.console.say("All packages installed.");
        } else {
            self.console
                .say(format!("Failed packages: {}", failed.join(", ")));
        }
        let installed = (summary.results.len() - failed.len()).to_string();
        let failed_count = failed.len().to_string();
        telemetry::event(
            "packages.installed",
            &[
                ("installed", installed.as_str()),
                ("failed", failed_count.as_str()),
            ],
        );
        Ok(())
    }

    async fn create_service(&mut self) -> io::Result<()> {
        let entry = self.config.entry_point();
        if !entry.is_file() {
            self.console.say(format!(
                "Warning: {} does not exist; the service will fail until it is deployed",
                entry.display()
            ));
        }
        match self.supervisor.create_service().await {
            Ok(report) => {
                self.console
                    .say(format!("Wrote {}", report.script_path.display()));
                self.show_output(&report.enable);
                self.show_output(&report.start);
                self.console.say(format!(
                    "Service {} enabled and started; logs in {}",
                    self.config.service_name,
                    self.config.log_file.display()
                ));
                telemetry::event("service.created", &[("name", self.config.service_name.as_str())]);
            }
            Err(err) => {
                self.console.say(format!("Error: {err}"));
                if let Some(output) = err.output() {
                    self.show_output(output);
                }
            }
        }
        Ok(())
    }

    async fn manage_service(&mut self) -> io::Result<()> {
        loop {
            self.console.say("");
            self.console
                .say(format!("Service {}", self.config.service_name));
            self.console.say(SERVICE_MENU);
            let Some(choice) = self.console.prompt("Select:")? else {
                return Ok(());
            };
            let action = match choice.as_str() {
                "1" => ControlAction::Start,
                "2" => ControlAction::Stop,
                "3" => ControlAction::Restart,
                "4" => ControlAction::Status,
                "0" => return Ok(()),
                "" => continue,
                other => {
                    self.console.say(format!("Unknown option {other:?}"));
                    continue;
                }
            };
            match self.supervisor.control(action).await {
                Ok(ControlReport::Host { action, output }) => {
                    self.console.say(format!("{action}: ok"));
                    self.show_output(&output);
                    telemetry::event("service.control", &[("action", action.as_str())]);
                }
                Ok(ControlReport::Status(ServiceStatus::Running(records))) => {
                    self.console.say("Status: running");
                    for record in records {
                        self.console.say(format!("  {record}"));
                    }
                }
                Ok(ControlReport::Status(ServiceStatus::NotRunning)) => {
                    self.console.say("Status: not running");
                }
                Err(err) => {
                    self.console.say(format!("Error: {err}"));
                    if let Some(output) = err.output() {
                        self.show_output(output);
                    }
                }
            }
        }
    }

    fn inspect_processes(&mut self) -> io::Result<()> {
        let label = format!("Pattern [{}]:", self.config.process_pattern);
        let Some(answer) = self.console.prompt(&label)? else {
            return Ok(());
        };
        let pattern = if answer.is_empty() {
            self.config.process_pattern.clone()
        } else {
            answer
        };

        loop {
            let records = match self.inspector.list(&pattern) {
                Ok(records) => records,
                Err(err) => {
                    self.console.say(format!("Error: {err}"));
                    return Ok(());
                }
            };
            if records.is_empty() {
                self.console
                    .say(format!("No processes matching {pattern:?}"));
                return Ok(());
            }
            for record in &records {
                self.console.say(format!("  {record}"));
            }

            let Some(answer) = self.console.prompt("PID to kill (empty to skip):")? else {
                return Ok(());
            };
            if answer.is_empty() {
                return Ok(());
            }
            let result = ProcessInspector::parse_pid(&answer)
                .and_then(|pid| self.inspector.kill(pid).map(|()| pid));
            match result {
                Ok(pid) => {
                    self.console.say(format!("Killed {pid}"));
                    telemetry::event("process.killed", &[("pattern", pattern.as_str())]);
                }
                Err(err) => self.console.say(format!("Error: {err}")),
            }
        }
    }

    async fn remove_service(&mut self) -> io::Result<()> {
        let question = format!("Remove service {}? [Y/n]:", self.config.service_name);
        let Some(answer) = self.console.prompt(&question)? else {
            return Ok(());
        };
        if !parse_confirmation(&answer) {
            self.console.say("Cancelled.");
            return Ok(());
        }
        let report = self.supervisor.remove_service().await;
        for pid in &report.killed {
            self.console.say(format!("Killed leftover pid {pid}"));
        }
        if report.log_removed {
            self.console
                .say(format!("Removed {}", self.config.log_file.display()));
        }
        if report.script_removed {
            self.console
                .say(format!("Removed {}", self.supervisor.script_path().display()));
        }
        for warning in &report.warnings {
            self.console.say(format!("Warning: {warning}"));
        }
        self.console.say("Service removed.");
        telemetry::event("service.removed", &[("name", self.config.service_name.as_str())]);
        Ok(())
    }

    fn show_settings(&mut self) -> io::Result<()> {
        let path = config_path();
        let source = if path.is_file() { "" } else { " (not created yet)" };
        self.console
            .say(format!("Config file: {}{source}", path.display()));
        match serde_json::to_string_pretty(&self.config) {
            Ok(text) => self.console.say(text),
            Err(err) => self.console.say(format!("Error: {err}")),
        }

        let answer = self
            .console
            .prompt("Type 'save' to write these settings, Enter to go back:")?;
        if answer.as_deref() == Some("save") {
            match self.config.save() {
                Ok(()) => self.console.say(format!("Saved {}", path.display())),
                Err(err) => self.console.say(format!("Error: {err}")),
            }
        }
        Ok(())
    }

    fn show_output(&mut self, output: &CommandOutput) {
        let text = output.combined();
        if !text.is_empty() {
            self.console.say(text.trim_end());
        }
    }
}
