//! appcast CLI - inspect app casts and manage update signatures
//!
//! This crate provides a command-line interface for:
//! - Running an update check against an app cast
//! - Converting app casts between RSS and JSON
//! - Signing files and verifying signatures
//! - Generating Ed25519 key pairs
//! - Comparing version strings

pub mod cli;
pub mod config;
pub mod output;

pub use cli::Cli;
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Verification failed - a signature did not match or was required
/// - 3: Could not determine - the update check did not reach a result
/// - 4: Invalid input - bad arguments or data provided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Signature verification failed (exit code 2)
    VerificationFailed = 2,
    /// Update check could not determine a result (exit code 3)
    CouldNotDetermine = 3,
    /// Invalid input provided (exit code 4)
    InvalidInput = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::VerificationFailed => "VERIFICATION_FAILED",
            ExitCode::CouldNotDetermine => "COULD_NOT_DETERMINE",
            ExitCode::InvalidInput => "INVALID_INPUT",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::VerificationFailed => "Signature verification failed",
            ExitCode::CouldNotDetermine => "The update check could not reach a result",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::VerificationFailed as i32, 2);
        assert_eq!(ExitCode::CouldNotDetermine as i32, 3);
        assert_eq!(ExitCode::InvalidInput as i32, 4);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::VerificationFailed), 2);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::GeneralError.name(), "GENERAL_ERROR");
        assert_eq!(ExitCode::VerificationFailed.name(), "VERIFICATION_FAILED");
        assert_eq!(ExitCode::CouldNotDetermine.name(), "COULD_NOT_DETERMINE");
        assert_eq!(ExitCode::InvalidInput.name(), "INVALID_INPUT");
    }

    #[test]
    fn test_exit_code_descriptions() {
        for code in [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::VerificationFailed,
            ExitCode::CouldNotDetermine,
            ExitCode::InvalidInput,
        ] {
            assert!(!code.description().is_empty());
        }
    }
}
