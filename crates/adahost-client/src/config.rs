//! Immutable client configuration.

use std::path::PathBuf;

/// Configuration passed at client creation. There is no hidden global; the
/// caller decides once and the value never changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// Refuse to connect at all.
    pub disabled: bool,
    /// Enable debug-level diagnostics.
    pub debug: bool,
    /// Enable verbose (trace-level) diagnostics; implies `debug`.
    pub verbose: bool,
    /// Keep going where a cautious default would stop (unsupported parts,
    /// degraded environments).
    pub force: bool,
    /// Log verbosity, 0 (off) to 5 (trace). `debug`/`verbose` raise this.
    pub log_level: u8,
    /// Overrides the GSP firmware path passed to
    /// [`crate::Client::load_firmware_file`].
    pub gsp_firmware_path: Option<PathBuf>,
}

impl Configuration {
    /// Effective verbosity with the boolean toggles folded in.
    pub fn effective_log_level(&self) -> u8 {
        if self.verbose {
            5
        } else if self.debug {
            self.log_level.max(4)
        } else {
            self.log_level
        }
    }
}
