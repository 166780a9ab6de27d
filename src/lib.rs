//! Stagecheck library exports.
//!
//! Bootstrap equivalence verification: build a reference compiler (Stage 0)
//! with a trusted toolchain, build Stage 1 with it, and compare the two on a
//! fixed set of checks. The binary is a thin wrapper around
//! [`pipeline::run`]; the modules are public for integration testing.

pub mod artifact;
pub mod checks;
pub mod compare;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod report;
pub mod telemetry;
pub mod timing;
pub mod workspace;

pub use config::Config;
pub use error::VerifyError;
pub use pipeline::RunOutcome;
pub use report::VerificationReport;
