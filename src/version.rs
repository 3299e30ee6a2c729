//! Verdict version information.
//!
//! ## Notes
//!
//! - The value is taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time.
//! - The CLI `--version` flag and the generated driver header both read this constant.

/// The verdict version string (for example, `0.1.0`).
pub const VERDICT_VERSION: &str = env!("CARGO_PKG_VERSION");
