//! PCO - shader compiler backend for a tile-based GPU ISA.
//!
//! Takes SSA-form PCO IR and lowers it to instruction groups ready for bit
//! packing: constant-register folding, copy propagation and dead-code
//! elimination, end-of-shader marking, register allocation, DRC wait
//! insertion and grouping.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use pco::core::CompilationSession;
//!
//! let mut shader = pco::parse_shader(
//!     "shader vertex
//!      entry main {
//!      b0:
//!          %0 = fadd vi0, vi1
//!          uvsw.write %0, io0
//!      }",
//! )?;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! pco::compile(&mut shader, &session)?;
//! assert!(shader.is_grouped);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - Shaders, functions, blocks, instructions and groups
//! - [`core`] - Errors, options and the compilation session
//! - [`passes`] - The backend passes and the [`compile`] driver
//! - [`text`] - Textual IR parser used by tests and `pcoc`

pub mod core;
pub mod ir;
pub mod passes;
pub mod text;

pub use crate::core::{
    AllocationFailed, CompilationSession, CompileError, CompileResult, Options, ParseError,
    SessionStats, Unsupported,
};
pub use crate::ir::{Function, Instr, Op, Ref, Shader, Stage};
pub use crate::passes::compile;
pub use crate::text::parse_shader;
