//! Host tooling for the escaped register bridge: stimulus scripts, a stderr
//! logger and a script runner.

/// Stderr backend for the `log` facade.
pub mod logger;
/// Script-driven bridge sessions.
pub mod runner;
/// Stimulus script parsing.
pub mod script;

#[cfg(test)]
use tempfile as _;
