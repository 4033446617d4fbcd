//! Registers a long-running script with the device init system and keeps an
//! eye on what is actually running.
//!
//! [`Supervisor`] owns one service: it renders a procd init script, drives it
//! through [`HostSupervisor`], and answers "is it alive" from the
//! [`ProcessTable`]. [`ProcessInspector`] is the unscoped list/kill tool.

mod descriptor;
mod error;
mod host;
mod inspector;
mod process;
mod render;
mod service;

pub use descriptor::{RespawnPolicy, ServiceDescriptor, UNBUFFERED_ENV};
pub use error::{InspectError, SupervisorError};
pub use host::{HostAction, HostSupervisor, InitScript};
pub use inspector::{ProcessInspector, DEFAULT_PATTERN};
pub use process::{ProcessRecord, ProcessTable, ProcfsTable, SignalKind};
pub use render::{ProcdRenderer, ScriptRenderer};
pub use service::{
    ControlAction, ControlReport, CreateReport, RemoveReport, ServiceStatus, Supervisor,
};
