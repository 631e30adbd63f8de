//! Runner-wide constants

/// Default values for the step loop
pub mod defaults {
    /// Steps run when neither the config nor the command line says otherwise
    pub const STEPS: usize = 1;
    /// Wall time between two steps
    pub const INTERVAL_MS: u64 = 16;
}

/// File locations
pub mod paths {
    /// Config file read when `--config` is not given
    pub const CONFIG_FILE: &str = "runner.json";
}
