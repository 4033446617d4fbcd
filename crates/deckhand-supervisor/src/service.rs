use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use deckhand_util::CommandOutput;

use crate::{
    descriptor::ServiceDescriptor,
    error::SupervisorError,
    host::{HostAction, HostSupervisor},
    process::{ProcessRecord, ProcessTable, SignalKind},
    render::{ProcdRenderer, ScriptRenderer},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Status,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    Running(Vec<ProcessRecord>),
    NotRunning,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlReport {
    Host {
        action: HostAction,
        output: CommandOutput,
    },
    Status(ServiceStatus),
}

#[derive(Clone, Debug)]
pub struct CreateReport {
    pub script_path: PathBuf,
    pub entry_point_present: bool,
    pub enable: CommandOutput,
    pub start: CommandOutput,
}

/// What `remove_service` did; problems are collected, never raised.
#[derive(Clone, Debug, Default)]
pub struct RemoveReport {
    pub stop: Option<CommandOutput>,
    pub disable: Option<CommandOutput>,
    pub killed: Vec<u32>,
    pub log_removed: bool,
    pub script_removed: bool,
    pub warnings: Vec<String>,
}

/// Stateless driver for one managed service.
///
/// Nothing is cached: the script's presence is read from disk and liveness
/// from the process table on every call.
pub struct Supervisor {
    descriptor: ServiceDescriptor,
    script_path: PathBuf,
    renderer: Box<dyn ScriptRenderer>,
    host: Box<dyn HostSupervisor>,
    processes: Arc<dyn ProcessTable>,
}

impl Supervisor {
    pub fn new(
        descriptor: ServiceDescriptor,
        script_path: impl Into<PathBuf>,
        host: Box<dyn HostSupervisor>,
        processes: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            descriptor,
            script_path: script_path.into(),
            renderer: Box::new(ProcdRenderer),
            host,
            processes,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ScriptRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn is_installed(&self) -> bool {
        self.script_path.is_file()
    }

    /// Writes the init script, truncates the log, then enables and starts it.
    pub async fn create_service(&self) -> Result<CreateReport, SupervisorError> {
        let entry_point_present = self.descriptor.entry_point.is_file();
        if !entry_point_present {
            tracing::warn!(
                "entry point {} does not exist yet",
                self.descriptor.entry_point.display()
            );
        }

        let script = self.renderer.render(&self.descriptor);
        write_executable(&self.script_path, &script)?;
        truncate_log(&self.descriptor.log_file)?;
        tracing::info!("wrote service script {}", self.script_path.display());

        let enable = self.host_action(HostAction::Enable).await?;
        let start = self.host_action(HostAction::Start).await?;
        Ok(CreateReport {
            script_path: self.script_path.clone(),
            entry_point_present,
            enable,
            start,
        })
    }

    pub async fn control(&self, action: ControlAction) -> Result<ControlReport, SupervisorError> {
        let host_action = match action {
            ControlAction::Start => HostAction::Start,
            ControlAction::Stop => HostAction::Stop,
            ControlAction::Restart => HostAction::Restart,
            ControlAction::Status => return Ok(ControlReport::Status(self.status()?)),
        };
        let output = self.host_action(host_action).await?;
        Ok(ControlReport::Host {
            action: host_action,
            output,
        })
    }

    /// Liveness from the process table, independent of registration state.
    pub fn status(&self) -> Result<ServiceStatus, SupervisorError> {
        let records = self
            .processes
            .list(&self.descriptor.process_pattern())
            .map_err(SupervisorError::ProcessQuery)?;
        Ok(if records.is_empty() {
            ServiceStatus::NotRunning
        } else {
            ServiceStatus::Running(records)
        })
    }

    /// Stops, disables and deletes the service. Safe to repeat.
    pub async fn remove_service(&self) -> RemoveReport {
        let mut report = RemoveReport::default();

        if self.is_installed() {
            report.stop = self
                .best_effort(HostAction::Stop, &mut report.warnings)
                .await;
            report.disable = self
                .best_effort(HostAction::Disable, &mut report.warnings)
                .await;
        }

        self.kill_stragglers(&mut report);

        report.log_removed =
            remove_if_present(&self.descriptor.log_file, "log file", &mut report.warnings);
        report.script_removed =
            remove_if_present(&self.script_path, "service script", &mut report.warnings);
        report
    }

    async fn host_action(&self, action: HostAction) -> Result<CommandOutput, SupervisorError> {
        let output = self.host.run(action).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SupervisorError::NotInstalled {
                    script: self.script_path.clone(),
                }
            } else {
                SupervisorError::io("run service script", &self.script_path, err)
            }
        })?;
        if output.success {
            Ok(output)
        } else {
            Err(SupervisorError::Command { action, output })
        }
    }

    async fn best_effort(
        &self,
        action: HostAction,
        warnings: &mut Vec<String>,
    ) -> Option<CommandOutput> {
        match self.host_action(action).await {
            Ok(output) => Some(output),
            Err(err) => {
                tracing::warn!("{action} during removal failed: {err}");
                warnings.push(format!("{action}: {err}"));
                err.output().cloned()
            }
        }
    }

    /// SIGKILLs anything still running the entry point after the host stop.
    fn kill_stragglers(&self, report: &mut RemoveReport) {
        let pattern = self.descriptor.process_pattern();
        let records = match self.processes.list(&pattern) {
            Ok(records) => records,
            Err(err) => {
                report
                    .warnings
                    .push(format!("process table query failed: {err}"));
                return;
            }
        };
        for record in records {
            match self.processes.signal(record.pid, SignalKind::Kill) {
                Ok(()) => {
                    tracing::info!("killed pid {} ({})", record.pid, record.command_line);
                    report.killed.push(record.pid);
                }
                Err(err) => report
                    .warnings
                    .push(format!("failed to kill pid {}: {err}", record.pid)),
            }
        }
    }
}

fn write_executable(path: &Path, contents: &str) -> Result<(), SupervisorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SupervisorError::io("create script dir", parent, e))?;
    }
    fs::write(path, contents).map_err(|e| SupervisorError::io("write service script", path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| SupervisorError::io("chmod service script", path, e))?;
    }
    Ok(())
}

fn truncate_log(path: &Path) -> Result<(), SupervisorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SupervisorError::io("create log dir", parent, e))?;
    }
    fs::File::create(path)
        .map(drop)
        .map_err(|e| SupervisorError::io("truncate log file", path, e))
}

fn remove_if_present(path: &Path, label: &str, warnings: &mut Vec<String>) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            tracing::warn!("failed to remove {label} {}: {err}", path.display());
            warnings.push(format!("failed to remove {label} {}: {err}", path.display()));
            false
        }
    }
}
