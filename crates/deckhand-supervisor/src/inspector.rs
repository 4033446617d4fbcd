use std::sync::Arc;

use crate::{
    error::InspectError,
    process::{ProcessRecord, ProcessTable, SignalKind},
};

/// Default search pattern offered to the operator.
pub const DEFAULT_PATTERN: &str = "python3";

/// Ad-hoc listing and killing of processes, unrelated to any service.
#[derive(Clone)]
pub struct ProcessInspector {
    table: Arc<dyn ProcessTable>,
}

impl ProcessInspector {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    pub fn list(&self, pattern: &str) -> Result<Vec<ProcessRecord>, InspectError> {
        self.table.list(pattern).map_err(InspectError::Query)
    }

    /// Sends SIGKILL. A pid that already exited surfaces as `Signal`.
    pub fn kill(&self, pid: u32) -> Result<(), InspectError> {
        self.table
            .signal(pid, SignalKind::Kill)
            .map_err(|source| InspectError::Signal { pid, source })?;
        tracing::info!("sent SIGKILL to pid {pid}");
        Ok(())
    }

    /// Parses operator input as a positive pid.
    pub fn parse_pid(input: &str) -> Result<u32, InspectError> {
        input
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|pid| *pid > 0 && *pid <= i32::MAX as u32)
            .ok_or_else(|| InspectError::InvalidPid {
                input: input.trim().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex};

    use super::*;

    #[derive(Default)]
    struct FakeTable {
        records: Vec<ProcessRecord>,
        signalled: Mutex<Vec<u32>>,
    }

    impl ProcessTable for FakeTable {
        fn list(&self, pattern: &str) -> io::Result<Vec<ProcessRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| r.command_line.contains(pattern))
                .cloned()
                .collect())
        }

        fn signal(&self, pid: u32, _kind: SignalKind) -> io::Result<()> {
            if self.records.iter().any(|r| r.pid == pid) {
                self.signalled.lock().unwrap().push(pid);
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(libc::ESRCH))
            }
        }
    }

    fn inspector() -> (Arc<FakeTable>, ProcessInspector) {
        let table = Arc::new(FakeTable {
            records: vec![
                ProcessRecord {
                    pid: 10,
                    command_line: "python3 /last/app.py".into(),
                },
                ProcessRecord {
                    pid: 11,
                    command_line: "/usr/sbin/odhcpd".into(),
                },
            ],
            ..FakeTable::default()
        });
        (table.clone(), ProcessInspector::new(table))
    }

    #[test]
    fn lists_by_substring() {
        let (_, inspector) = inspector();
        let found = inspector.list(DEFAULT_PATTERN).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 10);
        assert!(inspector.list("no-such-thing").unwrap().is_empty());
    }

    #[test]
    fn kill_reports_vanished_pid() {
        let (table, inspector) = inspector();
        inspector.kill(10).unwrap();
        assert_eq!(*table.signalled.lock().unwrap(), vec![10]);

        let err = inspector.kill(999).unwrap_err();
        assert!(matches!(err, InspectError::Signal { pid: 999, .. }));
    }

    #[test]
    fn parse_pid_accepts_only_positive_integers() {
        assert_eq!(ProcessInspector::parse_pid(" 1234\n").unwrap(), 1234);
        for bad in ["", "0", "-5", "abc", "12a", "4294967295"] {
            assert!(
                matches!(
                    ProcessInspector::parse_pid(bad),
                    Err(InspectError::InvalidPid { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}
