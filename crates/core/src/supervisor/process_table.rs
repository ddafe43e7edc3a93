//! Host process enumeration and signalling.
//!
//! [`ProcessTable`] is the seam between the supervisor and the operating
//! system. [`ProcfsTable`] reads `/proc` and delivers signals with `kill(2)`.

use std::io;
use std::path::{Path, PathBuf};

/// One entry from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Short executable name (`/proc/<pid>/comm`).
    pub name: String,
    /// Full command line, arguments joined with spaces.
    pub cmdline: String,
}

/// Signals the supervisor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// What happened when a signal was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// The process had already exited.
    AlreadyGone,
    Failed(String),
}

pub trait ProcessTable: Send + Sync {
    fn list(&self) -> io::Result<Vec<ProcessInfo>>;

    fn signal(&self, pid: u32, signal: Signal) -> SignalOutcome;

    /// `false` once the process has exited (zombies count as exited).
    fn is_alive(&self, pid: u32) -> bool;
}

/// Selects supervised processes out of a process listing.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
    /// Substring searched for in the command line.
    pub pattern: String,
    /// Executable names never matched (process-listing helpers).
    pub exclude_names: Vec<String>,
    /// Our own pid, never matched.
    pub self_pid: u32,
}

impl ProcessMatcher {
    pub fn new(pattern: impl Into<String>, exclude_names: Vec<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exclude_names,
            self_pid: std::process::id(),
        }
    }

    pub fn matches(&self, process: &ProcessInfo) -> bool {
        if process.pid == self.self_pid || self.exclude_names.iter().any(|n| *n == process.name) {
            return false;
        }
        process.name == self.pattern || process.cmdline.contains(&self.pattern)
    }

    pub fn select(&self, processes: Vec<ProcessInfo>) -> Vec<ProcessInfo> {
        processes.into_iter().filter(|p| self.matches(p)).collect()
    }
}

/// [`ProcessTable`] backed by procfs.
#[derive(Debug, Clone)]
pub struct ProcfsTable {
    root: PathBuf,
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_entry(&self, pid: u32) -> Option<ProcessInfo> {
        let dir = self.root.join(pid.to_string());
        // Entries vanish between readdir and read; skip them.
        let name = std::fs::read_to_string(dir.join("comm")).ok()?;
        let raw = std::fs::read(dir.join("cmdline")).ok()?;

        let cmdline = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        Some(ProcessInfo {
            pid,
            name: name.trim_end().to_string(),
            cmdline,
        })
    }
}

impl ProcessTable for ProcfsTable {
    fn list(&self) -> io::Result<Vec<ProcessInfo>> {
        let mut processes = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if let Some(info) = self.read_entry(pid) {
                processes.push(info);
            }
        }
        Ok(processes)
    }

    fn signal(&self, pid: u32, signal: Signal) -> SignalOutcome {
        let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
            return SignalOutcome::Failed(format!("pid {pid} out of range"));
        };
        if raw_pid <= 0 {
            return SignalOutcome::Failed(format!("refusing to signal pid {pid}"));
        }

        // Safety: kill(2) has no memory-safety preconditions; the pid is a
        // positive value so it never addresses a process group.
        let rc = unsafe { libc::kill(raw_pid, signal.as_raw()) };
        if rc == 0 {
            return SignalOutcome::Delivered;
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => SignalOutcome::AlreadyGone,
            _ => SignalOutcome::Failed(err.to_string()),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        stat_state(&self.root.join(pid.to_string()).join("stat"))
            .is_some_and(|state| state != 'Z' && state != 'X')
    }
}

/// Process state letter from `/proc/<pid>/stat`, `None` if the process is gone.
fn stat_state(path: &Path) -> Option<char> {
    let stat = std::fs::read_to_string(path).ok()?;
    // The command name field may itself contain ')' so split on the last one.
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}
