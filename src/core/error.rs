// This module defines the error types of the PCO backend using the thiserror crate.
// CompileError is the top-level enum returned by the pipeline driver and by every pass that
// can hit an unsupported input shape: a missing entrypoint, an empty function, grouping run
// twice, SSA or pseudo ops surviving into grouping, or operand counts a group cannot hold.
// Register allocation limits get their own enums so callers can match on which limit was
// hit: AllocationFailed when coloring runs out of registers (there is no spilling), and
// Unsupported for shapes the allocator does not handle (call graphs, non-32-bit SSA,
// control flow). ParseError reports malformed textual IR with its position. CompileResult<T>
// is the convenience alias used across the crate.

//! Error types for the PCO backend.

use thiserror::Error;

/// Main error type for shader compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("register allocation failed: {0}")]
    Allocation(#[from] AllocationFailed),

    #[error("unsupported shader shape: {0}")]
    Unsupported(#[from] Unsupported),

    #[error("shader has no entrypoint function")]
    NoEntrypoint,

    #[error("function {name} has no blocks")]
    EmptyFunction { name: String },

    #[error("shader is already grouped")]
    AlreadyGrouped,

    #[error("shader produced no instruction groups")]
    EmptyShader,

    #[error("SSA value %{ssa} reached instruction grouping")]
    UnallocatedSsa { ssa: u32 },

    #[error("{op} cannot be placed in an instruction group")]
    UngroupableOp { op: &'static str },

    #[error("{op} needs {count} register sources, a source bank holds 3")]
    TooManySources { op: &'static str, count: usize },

    #[error("{op} writes {count} register destinations, a group holds 2")]
    TooManyDests { op: &'static str, count: usize },

    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },
}

/// Coloring could not place a value; spilling is not implemented.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationFailed {
    #[error("no registers available for %{value} ({chans} channels, {temps} temps)")]
    NoRegistersAvailable { value: u32, chans: u8, temps: u32 },
}

/// Input shapes the register allocator does not handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {
    #[error("allocation across multiple functions")]
    MultiFunctionCallGraph,

    #[error("{found}-bit SSA values, only 32-bit values are allocatable")]
    MixedBitWidth { found: u32 },

    #[error("control flow or phi nodes")]
    ControlFlow,
}

/// Malformed textual IR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_convert_and_render() {
        let err: CompileError = Unsupported::MixedBitWidth { found: 64 }.into();
        assert_eq!(
            err.to_string(),
            "unsupported shader shape: 64-bit SSA values, only 32-bit values are allocatable"
        );

        let err: CompileError = AllocationFailed::NoRegistersAvailable {
            value: 5,
            chans: 4,
            temps: 2,
        }
        .into();
        assert!(matches!(
            err,
            CompileError::Allocation(AllocationFailed::NoRegistersAvailable { value: 5, .. })
        ));
    }
}
