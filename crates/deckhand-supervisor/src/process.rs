use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// A process as seen at the instant of the query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command_line: String,
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pid, self.command_line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Terminate,
    /// SIGKILL: cannot be caught, no grace period.
    Kill,
}

impl SignalKind {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// Live view of the host process table.
pub trait ProcessTable: Send + Sync {
    /// Processes whose command line contains `pattern`, in table order.
    fn list(&self, pattern: &str) -> io::Result<Vec<ProcessRecord>>;

    fn signal(&self, pid: u32, kind: SignalKind) -> io::Result<()>;
}

/// Linux adapter reading `/proc/<pid>/cmdline`, the same data `pgrep -af` uses.
#[derive(Clone, Debug)]
pub struct ProcfsTable {
    root: PathBuf,
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcfsTable {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_command_line(dir: &Path) -> Option<String> {
        let raw = fs::read(dir.join("cmdline")).ok()?;
        let line = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        let line = line.trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

impl ProcessTable for ProcfsTable {
    fn list(&self, pattern: &str) -> io::Result<Vec<ProcessRecord>> {
        let own_pid = std::process::id();
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            // Processes can vanish between readdir and read.
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if pid == own_pid {
                continue;
            }
            let Some(command_line) = Self::read_command_line(&entry.path()) else {
                continue;
            };
            if command_line.contains(pattern) {
                records.push(ProcessRecord { pid, command_line });
            }
        }
        Ok(records)
    }

    fn signal(&self, pid: u32, kind: SignalKind) -> io::Result<()> {
        let raw_pid = checked_pid(pid)?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(raw_pid, kind.as_raw()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Rejects pids that kill(2) would treat as process groups or broadcast.
pub(crate) fn checked_pid(pid: u32) -> io::Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pid {pid}"),
        )),
    }
}
