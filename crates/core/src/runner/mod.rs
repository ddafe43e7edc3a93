//! External tool invocation.
//!
//! The inference tools are untrusted, chatty CLIs. This module hides them
//! behind one narrow contract: a [`ToolSpec`] plus input in, structured JSON or a
//! [`RunnerError`] out. Callers never parse raw process output themselves.

pub mod executor;
pub mod overrides;
pub mod payload;
pub mod process;
pub mod subprocess;

pub use executor::{RunnerError, ToolExecutor, ToolInput, ToolOutput, ToolSpec};
pub use process::ProcessRunner;
