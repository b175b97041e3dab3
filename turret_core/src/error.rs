use thiserror::Error;

use crate::actuation::{Action, TurretState};

/// Why a command buffer was rejected before anything was touched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandFault {
    #[error("expected 3 bytes, got {0}")]
    WrongLength(usize),
    #[error("unknown selector {0:#04x}")]
    UnknownSelector(u8),
    #[error("magnitude must be two decimal digits")]
    BadMagnitude,
    #[error("width arithmetic overflowed")]
    Overflow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurretError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandFault),
    #[error("{action} refused while {state}")]
    GuardViolation { action: Action, state: TurretState },
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("hardware error: {0}")]
    Hardware(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("output line count ({lines}) does not match channel count ({channels})")]
    LineCountMismatch { lines: usize, channels: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
