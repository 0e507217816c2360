//! Application-wide error types.
//!
//! Module-local taxonomies (ledger, session) live next to their owners and
//! convert into [`AppError`] at the boundary where the process gives up.

use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn channel_error_display() {
        let e = AppError::Channel("telegram token rejected".into());
        assert!(e.to_string().contains("telegram token rejected"));
    }

    #[test]
    fn ledger_error_converts() {
        let e: AppError = LedgerError::Backend("connection refused".into()).into();
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
