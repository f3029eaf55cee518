// Consistent exit codes for the notetally CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/configuration error
//   10 = lock busy
//   12 = corrupted note
//   13 = network error

use std::process;

use notetally_daemon::config::ConfigError;
use notetally_daemon::engine::CycleError;
use notetally_daemon::lock::LockError;
use notetally_daemon::provider::ProviderError;
use notetally_daemon::store::StoreError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    LockBusy = 10,
    Corrupt = 12,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(cycle) = cause.downcast_ref::<CycleError>() {
                return Self::from_cycle(cycle);
            }
            if let Some(provider) = cause.downcast_ref::<ProviderError>() {
                return Self::from_provider(provider);
            }
            if let Some(lock) = cause.downcast_ref::<LockError>() {
                return Self::from_lock(lock);
            }
            if cause.downcast_ref::<StoreError>().is_some() {
                return Self::Network;
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    pub fn from_cycle(err: &CycleError) -> Self {
        match err {
            CycleError::LockTimeout(_) => Self::LockBusy,
            _ if err.is_corruption() => Self::Corrupt,
            CycleError::Write { .. }
            | CycleError::Transport { .. }
            | CycleError::DeadlineExceeded { .. } => Self::Network,
            _ => Self::Error,
        }
    }

    fn from_provider(err: &ProviderError) -> Self {
        match err {
            ProviderError::Lock(lock) => Self::from_lock(lock),
            ProviderError::Note(_) => Self::Corrupt,
            ProviderError::Write { .. } | ProviderError::Transport { .. } => Self::Network,
            ProviderError::NotFound { .. } => Self::Error,
        }
    }

    fn from_lock(err: &LockError) -> Self {
        match err {
            LockError::Timeout { .. } => Self::LockBusy,
            LockError::Store(_) => Self::Network,
            LockError::Encode(_) => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
