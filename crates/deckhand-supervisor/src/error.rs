use std::{io, path::PathBuf};

use deckhand_util::CommandOutput;
use thiserror::Error;

use crate::host::HostAction;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The host supervisor ran but reported failure; `output` is verbatim.
    #[error("`{action}` failed with exit {}", .output.code)]
    Command {
        action: HostAction,
        output: CommandOutput,
    },
    #[error("service script {} is not installed", .script.display())]
    NotInstalled { script: PathBuf },
    #[error("{operation} failed for {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("process table query failed")]
    ProcessQuery(#[source] io::Error),
}

impl SupervisorError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Captured host output, when there is any to show the operator.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            Self::Command { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("{input:?} is not a valid pid")]
    InvalidPid { input: String },
    #[error("process table query failed")]
    Query(#[source] io::Error),
    #[error("failed to signal pid {pid}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}
