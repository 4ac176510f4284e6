//! Utility functions.

use std::num::TryFromIntError;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Represents the code to exit the process with.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExitCode(pub isize);

impl ExitCode {
    /// Return an exit code corresponding to success.
    pub fn success() -> Self {
        Self(0)
    }

    /// Determine whether or not this exit code represents a successful
    /// termination.
    pub fn is_success(&self) -> bool {
        match self {
            ExitCode(0) => true,
            ExitCode(_) => false,
        }
    }
}

impl TryFrom<ExitStatus> for ExitCode {
    type Error = TryFromIntError;

    fn try_from(status: ExitStatus) -> Result<Self, Self::Error> {
        // Killed by a signal: there's no code to report, so call it a failure.
        let exit_code = status.code().unwrap_or(1);
        Ok(Self(exit_code.try_into()?))
    }
}

/// Encapsulate both an `eyre::Result<T>` and a possible subcommand exit code.
///
/// The outer `Err` is an unexpected failure with a report attached. The inner
/// `Err` means that a message has already been shown to the user and the
/// process should exit with the given code.
pub type EyreExitOr<T> = eyre::Result<Result<T, ExitCode>>;

/// Propagate an inner `Err(ExitCode)` out of a function returning
/// [`EyreExitOr`], otherwise evaluate to the inner value.
#[macro_export]
macro_rules! try_exit_code {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(exit_code) => {
                return Ok(Err(exit_code));
            }
        }
    };
}

/// Returns a path for a given file, searching through PATH to find it.
pub fn get_from_path(exe_name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let exe_path = dir.join(exe_name);
            if exe_path.is_file() {
                Some(exe_path)
            } else {
                None
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halve(value: usize) -> EyreExitOr<usize> {
        if value % 2 == 0 {
            Ok(Ok(value / 2))
        } else {
            Ok(Err(ExitCode(1)))
        }
    }

    fn quarter(value: usize) -> EyreExitOr<usize> {
        let half = try_exit_code!(halve(value)?);
        halve(half)
    }

    #[test]
    fn test_try_exit_code() -> eyre::Result<()> {
        assert_eq!(quarter(8)?, Ok(2));
        assert_eq!(quarter(6)?, Err(ExitCode(1)));
        assert_eq!(quarter(3)?, Err(ExitCode(1)));
        assert!(ExitCode::success().is_success());
        assert!(!ExitCode(128).is_success());
        Ok(())
    }
}
