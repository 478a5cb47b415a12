//! Error types for the flocking core.
//!
//! [`FlockError`] covers configuration problems and contract violations,
//! both fatal. [`DispatchError`] covers a single frame that could not be
//! simulated; the caller logs it and the previous state persists.

use std::fmt;

use crate::kernels::Phase;

/// A frame-level failure. The tick that produced it did not advance state.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The device buffers were released by `shutdown`.
    DeviceReleased,
    /// The supplied delta time was negative or not finite.
    InvalidDeltaTime(f32),
    /// A live-adjusted steering parameter is out of range.
    InvalidParameter { name: &'static str, value: f32 },
    /// A work item produced a non-finite value.
    NonFinite { phase: Phase, index: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::DeviceReleased => {
                write!(f, "Device buffers have been released.")
            }
            DispatchError::InvalidDeltaTime(dt) => {
                write!(f, "Delta time must be finite and non-negative, got {dt}")
            }
            DispatchError::InvalidParameter { name, value } => {
                write!(f, "Steering parameter `{name}` is out of range: {value}")
            }
            DispatchError::NonFinite { phase, index } => {
                write!(f, "{phase} phase produced a non-finite value for agent {index}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// A fatal error: the simulation cannot start or a size contract was broken.
#[derive(Debug, Clone, PartialEq)]
pub enum FlockError {
    /// Population size must be at least one.
    InvalidPopulation(usize),
    /// No seed positions were supplied.
    EmptySeeds,
    /// A configuration value is out of range.
    InvalidParameter { name: &'static str, value: f32 },
    /// The kernel registry has no entry for a phase.
    MissingKernel(Phase),
    /// The compute device could not be created.
    DeviceCreation(String),
    /// Two parallel structures disagree on the population size.
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An agent index outside `[0, population)`.
    IndexOutOfRange { index: usize, len: usize },
    /// Owner ids are non-negative; `-1` is reserved for "unowned".
    InvalidOwner(i32),
    /// A dispatch failure surfaced through a fallible API.
    Dispatch(DispatchError),
}

impl fmt::Display for FlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlockError::InvalidPopulation(n) => {
                write!(f, "Population size must be at least 1, got {n}")
            }
            FlockError::EmptySeeds => write!(f, "At least one seed position is required."),
            FlockError::InvalidParameter { name, value } => {
                write!(f, "Configuration value `{name}` is out of range: {value}")
            }
            FlockError::MissingKernel(phase) => {
                write!(f, "No compute kernel registered for the {phase} phase")
            }
            FlockError::DeviceCreation(msg) => {
                write!(f, "Failed to create compute device: {msg}")
            }
            FlockError::SizeMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "Size mismatch for {what}: expected {expected} agents, got {actual}"
            ),
            FlockError::IndexOutOfRange { index, len } => {
                write!(f, "Agent index {index} out of range for population {len}")
            }
            FlockError::InvalidOwner(id) => write!(f, "Invalid owner id {id}"),
            FlockError::Dispatch(err) => write!(f, "Dispatch failed: {err}"),
        }
    }
}

impl std::error::Error for FlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlockError::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DispatchError> for FlockError {
    fn from(err: DispatchError) -> Self {
        FlockError::Dispatch(err)
    }
}

pub type Result<T> = std::result::Result<T, FlockError>;
