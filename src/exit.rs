// src/exit.rs
//! Standardized process exit codes for `scanward`.
//!
//! Provides a stable contract for scripts and automation.

use std::process::Termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ScanwardExit {
    /// Operation completed successfully (or reported zero findings).
    Success = 0,
    /// Generic error (e.g. IO, missing analyzer binary).
    Error = 1,
    /// Input validation failed (missing or unparsable compilation database).
    InvalidInput = 2,
    /// Internal error inside the orchestrator itself.
    Internal = 64,
    /// Run aborted by keyboard interrupt.
    Interrupted = 130,
}

impl ScanwardExit {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn exit(self) -> ! {
        std::process::exit(self.code())
    }
}

impl Termination for ScanwardExit {
    fn report(self) -> std::process::ExitCode {
        // Exit codes travel as u8 on unix-likes; the chosen values all fit.
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        std::process::ExitCode::from(self.code() as u8)
    }
}
