// This module collects the infrastructure shared by every PCO backend pass: the error
// taxonomy, the compiler Options, the arena-backed CompilationSession with its statistics,
// and the dense BitSet used for SSA and register bookkeeping. Nothing in here knows about
// individual opcodes; the passes module builds on these pieces.

//! Core backend infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based scratch allocation using `bumpalo`
//! - Per-pass progress and compilation statistics
//!
//! ## Errors (`error`)
//! - `thiserror` enums for every unsupported input shape

pub mod bitset;
pub mod error;
pub mod options;
pub mod session;
pub mod test_utils;

pub use bitset::BitSet;
pub use error::{AllocationFailed, CompileError, CompileResult, ParseError, Unsupported};
pub use options::{Options, DEFAULT_ICACHE_ALIGN, DEFAULT_NUM_TEMPS};
pub use session::{CompilationSession, PassRun, SessionStats};
