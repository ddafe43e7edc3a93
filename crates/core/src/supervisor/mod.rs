//! Supervision of the local LLM inference server.

pub mod probe;
pub mod process_table;
pub mod server;

pub use probe::{probe, Liveness};
pub use process_table::{
    ProcessInfo, ProcessMatcher, ProcessTable, ProcfsTable, Signal, SignalOutcome,
};
pub use server::{
    Availability, LaunchSpec, LlmServerSupervisor, ServerArgs, ServerPhase, StopReport,
    SupervisorError, SupervisorSettings, DEFAULT_PROBE_TIMEOUT,
};
