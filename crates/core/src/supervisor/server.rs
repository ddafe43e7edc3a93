//! Lifecycle supervision of the local llama-server.
//!
//! The server is a long-lived, detached child that owns a TCP port. The
//! supervisor probes that port, starts the server on demand, and stops
//! every matching process on the host either gracefully (SIGTERM, grace
//! period, SIGKILL for survivors) or forcibly (SIGKILL at once).
//!
//! Only one start may be in flight per supervisor. Concurrent callers see
//! [`Availability::StartInProgress`] instead of launching a second server.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use super::probe::{probe, Liveness};
use super::process_table::{ProcessMatcher, ProcessTable, ProcfsTable, Signal, SignalOutcome};

/// Default TCP probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor's view of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPhase {
    Down,
    Starting,
    Up,
}

/// Answer to "make sure the server is running".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    AlreadyUp,
    /// Launched and waited out the startup grace period.
    Started,
    /// Another caller is starting the server right now.
    StartInProgress,
}

/// How to launch the server.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Checked before launch when set.
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub host: String,
    pub port: u16,
    pub probe_timeout: Duration,
    pub startup_grace: Duration,
    pub stop_grace: Duration,
    /// Matched against process names and command lines when stopping.
    pub process_name: String,
    pub exclude_names: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Model file not found: {}", .0.display())]
    ModelMissing(PathBuf),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to enumerate processes: {0}")]
    Enumerate(#[source] io::Error),
}

/// Outcome of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub forced: bool,
    pub found: Vec<u32>,
    pub terminated: Vec<u32>,
    pub errors: Vec<String>,
    pub message: String,
}

impl StopReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty() && self.terminated.len() == self.found.len()
    }
}

pub struct LlmServerSupervisor<T = ProcfsTable> {
    settings: SupervisorSettings,
    launch: LaunchSpec,
    table: Arc<T>,
    phase: Mutex<ServerPhase>,
}

impl<T: ProcessTable + 'static> LlmServerSupervisor<T> {
    pub fn new(settings: SupervisorSettings, launch: LaunchSpec, table: T) -> Self {
        Self {
            settings,
            launch,
            table: Arc::new(table),
            phase: Mutex::new(ServerPhase::Down),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Last phase recorded by this supervisor. Use [`probe`](Self::probe)
    /// for the live answer.
    pub fn phase(&self) -> ServerPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn probe(&self) -> Liveness {
        let liveness = probe(
            &self.settings.host,
            self.settings.port,
            self.settings.probe_timeout,
        )
        .await;

        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != ServerPhase::Starting {
            *phase = match liveness {
                Liveness::Up => ServerPhase::Up,
                Liveness::Down => ServerPhase::Down,
            };
        }
        liveness
    }

    /// Probe, and start the server if it is down.
    pub async fn ensure_running(&self) -> Result<Availability, SupervisorError> {
        if self.probe().await == Liveness::Up {
            return Ok(Availability::AlreadyUp);
        }
        tracing::info!(port = self.settings.port, "llama-server is down, starting it");
        self.start().await
    }

    /// Launch the server without probing first.
    ///
    /// Returns once the startup grace period has elapsed. Readiness after
    /// the grace period is not guaranteed.
    pub async fn start(&self) -> Result<Availability, SupervisorError> {
        let Some(guard) = StartGuard::acquire(&self.phase) else {
            tracing::info!("llama-server start already in progress");
            return Ok(Availability::StartInProgress);
        };

        self.launch_detached().await?;
        tokio::time::sleep(self.settings.startup_grace).await;

        let liveness = probe(
            &self.settings.host,
            self.settings.port,
            self.settings.probe_timeout,
        )
        .await;
        match liveness {
            Liveness::Up => {
                tracing::info!(port = self.settings.port, "llama-server is up");
                guard.finish(ServerPhase::Up);
            }
            Liveness::Down => {
                tracing::warn!(
                    port = self.settings.port,
                    grace_secs = self.settings.startup_grace.as_secs(),
                    "llama-server not accepting connections after startup grace period"
                );
                guard.finish(ServerPhase::Down);
            }
        }

        Ok(Availability::Started)
    }

    /// SIGTERM every matching process, then SIGKILL whatever survives the
    /// stop grace period.
    pub async fn stop_graceful(&self) -> Result<StopReport, SupervisorError> {
        self.stop(false).await
    }

    /// SIGKILL every matching process immediately.
    pub async fn stop_forced(&self) -> Result<StopReport, SupervisorError> {
        self.stop(true).await
    }

    async fn launch_detached(&self) -> Result<(), SupervisorError> {
        if let Some(model) = &self.launch.model_path {
            if !tokio::fs::try_exists(model).await.unwrap_or(false) {
                tracing::error!(model = %model.display(), "Model file missing, not launching llama-server");
                return Err(SupervisorError::ModelMissing(model.clone()));
            }
        }

        // A fresh process group keeps the server alive across our own
        // shutdown signals; no stdio is inherited.
        let child = Command::new(&self.launch.program)
            .args(&self.launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                program: self.launch.program.clone(),
                source,
            })?;

        tracing::info!(
            pid = child.id(),
            program = %self.launch.program,
            port = self.settings.port,
            "llama-server launched"
        );
        Ok(())
    }

    async fn stop(&self, forced: bool) -> Result<StopReport, SupervisorError> {
        let matcher = ProcessMatcher::new(
            self.settings.process_name.clone(),
            self.settings.exclude_names.clone(),
        );
        let listing = self
            .on_table(|table| table.list())
            .await
            .and_then(|listed| listed)
            .map_err(SupervisorError::Enumerate)?;
        let targets = matcher.select(listing);
        let name = &self.settings.process_name;

        if targets.is_empty() {
            tracing::info!(process = %name, "No processes to stop");
            return Ok(StopReport {
                forced,
                found: vec![],
                terminated: vec![],
                errors: vec![],
                message: format!("No {name} processes found"),
            });
        }

        let found: Vec<u32> = targets.iter().map(|p| p.pid).collect();
        let mut terminated = Vec::new();
        let mut errors = Vec::new();

        tracing::info!(process = %name, pids = ?found, forced, "Stopping processes");

        if forced {
            for &pid in &found {
                self.kill_now(pid, &mut terminated, &mut errors);
            }
        } else {
            let mut waiting = Vec::new();
            for &pid in &found {
                match self.table.signal(pid, Signal::Terminate) {
                    SignalOutcome::Delivered => waiting.push(pid),
                    SignalOutcome::AlreadyGone => terminated.push(pid),
                    SignalOutcome::Failed(e) => errors.push(format!("SIGTERM to pid {pid}: {e}")),
                }
            }

            if !waiting.is_empty() {
                tokio::time::sleep(self.settings.stop_grace).await;
            }

            let survivors = self
                .on_table(move |table| {
                    waiting
                        .into_iter()
                        .map(|pid| (pid, table.is_alive(pid)))
                        .collect::<Vec<_>>()
                })
                .await
                .map_err(SupervisorError::Enumerate)?;

            for (pid, alive) in survivors {
                if alive {
                    tracing::warn!(pid, "Process survived SIGTERM, sending SIGKILL");
                    self.kill_now(pid, &mut terminated, &mut errors);
                } else {
                    terminated.push(pid);
                }
            }
        }

        terminated.sort_unstable();

        let mut message = format!(
            "Terminated {} of {} {name} process(es)",
            terminated.len(),
            found.len()
        );
        if !errors.is_empty() {
            message.push_str(&format!(" ({} error(s))", errors.len()));
            tracing::error!(errors = ?errors, "Errors while stopping processes");
        }

        if terminated.len() == found.len() {
            // An in-flight start keeps its guard; it records the final phase.
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase != ServerPhase::Starting {
                *phase = ServerPhase::Down;
            }
        }

        Ok(StopReport {
            forced,
            found,
            terminated,
            errors,
            message,
        })
    }

    /// Run a procfs read off the async worker threads.
    async fn on_table<R, F>(&self, f: F) -> io::Result<R>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || f(&table))
            .await
            .map_err(io::Error::other)
    }

    fn kill_now(&self, pid: u32, terminated: &mut Vec<u32>, errors: &mut Vec<String>) {
        match self.table.signal(pid, Signal::Kill) {
            SignalOutcome::Delivered | SignalOutcome::AlreadyGone => terminated.push(pid),
            SignalOutcome::Failed(e) => errors.push(format!("SIGKILL to pid {pid}: {e}")),
        }
    }
}

/// Holds the `Starting` phase; reverts to `Down` if dropped unfinished.
struct StartGuard<'a> {
    phase: &'a Mutex<ServerPhase>,
    finished: bool,
}

impl<'a> StartGuard<'a> {
    fn acquire(phase: &'a Mutex<ServerPhase>) -> Option<Self> {
        let mut current = phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == ServerPhase::Starting {
            return None;
        }
        *current = ServerPhase::Starting;
        Some(Self {
            phase,
            finished: false,
        })
    }

    fn finish(mut self, next: ServerPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
        self.finished = true;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = ServerPhase::Down;
        }
    }
}

/// llama-server command-line arguments for a model and port.
#[derive(Debug, Clone)]
pub struct ServerArgs {
    pub model_path: PathBuf,
    pub port: u16,
    pub n_gpu_layers: u32,
    pub context_size: u32,
    pub batch_size: u32,
    pub ubatch_size: u32,
    pub cache_type_k: String,
    pub cache_type_v: String,
    pub flash_attn: bool,
    pub mlock: bool,
}

impl ServerArgs {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model_path.display().to_string(),
            "--port".to_string(),
            self.port.to_string(),
            "-ngl".to_string(),
            self.n_gpu_layers.to_string(),
            "-c".to_string(),
            self.context_size.to_string(),
            "-b".to_string(),
            self.batch_size.to_string(),
            "-ub".to_string(),
            self.ubatch_size.to_string(),
            "-ctk".to_string(),
            self.cache_type_k.clone(),
            "-ctv".to_string(),
            self.cache_type_v.clone(),
        ];
        if self.flash_attn {
            args.push("-fa".to_string());
        }
        if self.mlock {
            args.push("--mlock".to_string());
        }
        args
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    use crate::supervisor::ProcessInfo;
    use super::*;

    /// How a fake process reacts to signals.
    #[derive(Clone, Copy)]
    enum Reaction {
        /// Exits on SIGTERM.
        Exits,
        /// Ignores SIGTERM, dies on SIGKILL.
        Stubborn,
        /// Already exited by the time it is signalled.
        Gone,
        /// Signalling is not permitted.
        Denied,
    }

    struct FakeTable {
        processes: Vec<ProcessInfo>,
        reactions: HashMap<u32, Reaction>,
        alive: Mutex<HashMap<u32, bool>>,
        sent: Mutex<Vec<(u32, Signal)>>,
    }

    impl FakeTable {
        fn new(entries: &[(u32, &str, Reaction)]) -> Self {
            Self {
                processes: entries
                    .iter()
                    .map(|(pid, name, _)| ProcessInfo {
                        pid: *pid,
                        name: name.to_string(),
                        cmdline: format!("{name} -m model.gguf"),
                    })
                    .collect(),
                reactions: entries.iter().map(|(pid, _, r)| (*pid, *r)).collect(),
                alive: Mutex::new(entries.iter().map(|(pid, _, _)| (*pid, true)).collect()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(u32, Signal)> {
            self.sent.lock().expect("lock").clone()
        }
    }

    impl ProcessTable for FakeTable {
        fn list(&self) -> io::Result<Vec<ProcessInfo>> {
            Ok(self.processes.clone())
        }

        fn signal(&self, pid: u32, signal: Signal) -> SignalOutcome {
            self.sent.lock().expect("lock").push((pid, signal));
            let mut alive = self.alive.lock().expect("lock");
            match (self.reactions[&pid], signal) {
                (Reaction::Gone, _) => SignalOutcome::AlreadyGone,
                (Reaction::Denied, _) => SignalOutcome::Failed("Operation not permitted".into()),
                (Reaction::Stubborn, Signal::Terminate) => SignalOutcome::Delivered,
                (Reaction::Exits, _) | (Reaction::Stubborn, Signal::Kill) => {
                    alive.insert(pid, false);
                    SignalOutcome::Delivered
                }
            }
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().expect("lock").get(&pid).copied().unwrap_or(false)
        }
    }

    fn settings(port: u16) -> SupervisorSettings {
        SupervisorSettings {
            host: "127.0.0.1".to_string(),
            port,
            probe_timeout: Duration::from_millis(500),
            startup_grace: Duration::from_millis(50),
            stop_grace: Duration::from_millis(20),
            process_name: "llama-server".to_string(),
            exclude_names: vec!["pgrep".to_string()],
        }
    }

    fn launch(program: &str) -> LaunchSpec {
        LaunchSpec {
            program: program.to_string(),
            args: vec![],
            model_path: None,
        }
    }

    fn supervisor(port: u16, table: FakeTable) -> LlmServerSupervisor<FakeTable> {
        LlmServerSupervisor::new(settings(port), launch("true"), table)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn stop_with_no_processes_is_success() {
        let sup = supervisor(closed_port().await, FakeTable::new(&[]));

        let report = sup.stop_graceful().await.expect("stop");

        assert!(report.success());
        assert!(report.found.is_empty());
        assert_eq!(report.message, "No llama-server processes found");
    }

    #[tokio::test]
    async fn graceful_stop_escalates_survivors() {
        let table = FakeTable::new(&[
            (10, "llama-server", Reaction::Exits),
            (11, "llama-server", Reaction::Stubborn),
            (12, "llama-server", Reaction::Gone),
        ]);
        let sup = supervisor(closed_port().await, table);

        let report = sup.stop_graceful().await.expect("stop");

        assert!(report.success(), "{report:?}");
        assert_eq!(report.found, vec![10, 11, 12]);
        assert_eq!(report.terminated, vec![10, 11, 12]);
        assert_eq!(report.message, "Terminated 3 of 3 llama-server process(es)");

        let sent = sup.table.sent();
        assert!(sent.contains(&(11, Signal::Kill)));
        assert!(!sent.contains(&(10, Signal::Kill)));
        assert_eq!(sup.phase(), ServerPhase::Down);
    }

    #[tokio::test]
    async fn errors_are_collected_and_others_still_stopped() {
        let table = FakeTable::new(&[
            (20, "llama-server", Reaction::Denied),
            (21, "llama-server", Reaction::Exits),
        ]);
        let sup = supervisor(closed_port().await, table);

        let report = sup.stop_graceful().await.expect("stop");

        assert!(!report.success());
        assert_eq!(report.terminated, vec![21]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("pid 20"));
        assert!(report.message.contains("1 of 2"));
    }

    #[tokio::test]
    async fn forced_stop_sends_only_sigkill() {
        let table = FakeTable::new(&[
            (30, "llama-server", Reaction::Stubborn),
            (31, "llama-server", Reaction::Exits),
        ]);
        let sup = supervisor(closed_port().await, table);

        let report = sup.stop_forced().await.expect("stop");

        assert!(report.forced);
        assert!(report.success());
        assert!(sup.table.sent().iter().all(|(_, s)| *s == Signal::Kill));
    }

    #[tokio::test]
    async fn helpers_are_never_targeted() {
        let table = FakeTable::new(&[
            (40, "pgrep", Reaction::Exits),
            (41, "llama-server", Reaction::Exits),
        ]);
        let sup = supervisor(closed_port().await, table);

        let report = sup.stop_graceful().await.expect("stop");

        assert_eq!(report.found, vec![41]);
        assert!(sup.table.sent().iter().all(|(pid, _)| *pid == 41));
    }

    #[tokio::test]
    async fn ensure_running_when_up_does_not_launch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let sup = LlmServerSupervisor::new(
            settings(port),
            launch("/nonexistent/llama-server"),
            FakeTable::new(&[]),
        );

        assert_matches!(sup.ensure_running().await, Ok(Availability::AlreadyUp));
        assert_eq!(sup.phase(), ServerPhase::Up);
    }

    #[tokio::test]
    async fn start_then_probe_sees_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let sup = supervisor(port, FakeTable::new(&[]));

        assert_matches!(sup.start().await, Ok(Availability::Started));
        assert_eq!(sup.phase(), ServerPhase::Up);
        assert_eq!(sup.probe().await, Liveness::Up);
    }

    #[tokio::test]
    async fn concurrent_starts_launch_once() {
        let sup = supervisor(closed_port().await, FakeTable::new(&[]));

        let (a, b) = tokio::join!(sup.start(), sup.start());

        let mut outcomes = vec![a.expect("start"), b.expect("start")];
        outcomes.sort_by_key(|o| *o == Availability::StartInProgress);
        assert_eq!(
            outcomes,
            vec![Availability::Started, Availability::StartInProgress]
        );
        assert_eq!(sup.phase(), ServerPhase::Down);
    }

    #[tokio::test]
    async fn stop_during_start_keeps_start_guard() {
        let mut slow = settings(closed_port().await);
        slow.startup_grace = Duration::from_millis(400);
        let sup = LlmServerSupervisor::new(
            slow,
            launch("true"),
            FakeTable::new(&[(70, "llama-server", Reaction::Exits)]),
        );

        let (first, (report, phase_after_stop, second)) = tokio::join!(sup.start(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let report = sup.stop_graceful().await.expect("stop");
            let phase = sup.phase();
            (report, phase, sup.start().await)
        });

        assert_eq!(report.terminated, vec![70]);
        assert_eq!(phase_after_stop, ServerPhase::Starting);
        assert_matches!(second, Ok(Availability::StartInProgress));
        assert_matches!(first, Ok(Availability::Started));
        assert_eq!(sup.phase(), ServerPhase::Down);
    }

    #[tokio::test]
    async fn launch_failure_resets_phase() {
        let sup = LlmServerSupervisor::new(
            settings(closed_port().await),
            launch("/nonexistent/llama-server"),
            FakeTable::new(&[]),
        );

        assert_matches!(sup.ensure_running().await, Err(SupervisorError::Launch { .. }));
        assert_eq!(sup.phase(), ServerPhase::Down);
    }

    #[tokio::test]
    async fn missing_model_is_reported() {
        let mut spec = launch("true");
        spec.model_path = Some(PathBuf::from("/nonexistent/model.gguf"));
        let sup = LlmServerSupervisor::new(settings(closed_port().await), spec, FakeTable::new(&[]));

        assert_matches!(sup.start().await, Err(SupervisorError::ModelMissing(p)) if p.ends_with("model.gguf"));
        assert_eq!(sup.phase(), ServerPhase::Down);
    }

    #[test]
    fn server_args_include_optional_flags() {
        let mut args = ServerArgs {
            model_path: PathBuf::from("/models/gemma.gguf"),
            port: 4000,
            n_gpu_layers: 48,
            context_size: 8192,
            batch_size: 512,
            ubatch_size: 128,
            cache_type_k: "q5_1".to_string(),
            cache_type_v: "q5_1".to_string(),
            flash_attn: true,
            mlock: true,
        };
        let joined = args.to_args().join(" ");
        assert!(joined.starts_with("-m /models/gemma.gguf --port 4000 -ngl 48 -c 8192"));
        assert!(joined.ends_with("-ctk q5_1 -ctv q5_1 -fa --mlock"));

        args.flash_attn = false;
        args.mlock = false;
        assert!(args.to_args().join(" ").ends_with("-ctv q5_1"));
    }
}
