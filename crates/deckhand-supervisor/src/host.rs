use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use deckhand_util::{run_command, CommandOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostAction {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
}

impl HostAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The device's init system, driven one action at a time.
#[async_trait]
pub trait HostSupervisor: Send + Sync {
    async fn run(&self, action: HostAction) -> io::Result<CommandOutput>;
}

/// An rc.common script invoked as `<script> <action>`.
#[derive(Clone, Debug)]
pub struct InitScript {
    path: PathBuf,
}

impl InitScript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HostSupervisor for InitScript {
    async fn run(&self, action: HostAction) -> io::Result<CommandOutput> {
        tracing::info!("{} {action}", self.path.display());
        run_command(&self.path, [action.as_str()]).await
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use super::*;

    #[tokio::test]
    async fn init_script_receives_action_argument() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("demo");
        fs::write(&path, "#!/bin/sh\necho \"action=$1\"\n[ \"$1\" != disable ]\n")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        let script = InitScript::new(&path);

        let output = script.run(HostAction::Restart).await?;
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "action=restart");

        let output = script.run(HostAction::Disable).await?;
        assert!(!output.success);
        assert_eq!(output.code, 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let script = InitScript::new("/nonexistent/deckhand/init");
        let err = script.run(HostAction::Start).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
