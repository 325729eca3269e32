use super::ResolveError;
use crate::jvm::code::DecodeError;
use crate::util::Offset;
use std::fmt::{Display, Formatter};

/// Failures that abort the simulation of the current method
#[derive(Clone, Debug, PartialEq)]
pub enum SimulationError {
    /// An instruction pops more values than are on the stack
    StackUnderflow {
        offset: Offset,
        needed: usize,
        depth: usize,
    },

    /// A constant pool reference is malformed (not merely missing)
    Unresolved { offset: Offset, error: ResolveError },

    /// The method has more instructions than the configured cap
    InstructionLimit { limit: usize },

    /// The method body could not be decoded
    Decode(DecodeError),
}

impl From<DecodeError> for SimulationError {
    fn from(err: DecodeError) -> SimulationError {
        SimulationError::Decode(err)
    }
}

impl Display for SimulationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::StackUnderflow {
                offset,
                needed,
                depth,
            } => write!(
                f,
                "stack underflow at {}: needed {} values but depth is {}",
                offset, needed, depth
            ),
            SimulationError::Unresolved { offset, error } => write!(f, "{} at {}", error, offset),
            SimulationError::InstructionLimit { limit } => {
                write!(f, "method exceeds the limit of {} instructions", limit)
            }
            SimulationError::Decode(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Failure inside a detector hook
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookError(pub String);

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HookError {}

/// Problems that don't stop the simulation, but make its results less complete
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A referenced class or member couldn't be resolved, so the value it produced is unknown
    ResolutionMiss { offset: Offset, reference: String },

    /// A detector hook failed (the instruction's effect was still applied)
    HookFailed { offset: Offset, error: HookError },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::ResolutionMiss { offset, reference } => {
                write!(f, "unresolved reference {} at {}", reference, offset)
            }
            Diagnostic::HookFailed { offset, error } => {
                write!(f, "detector failed at {}: {}", offset, error)
            }
        }
    }
}
