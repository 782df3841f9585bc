// This module reads PCO IR back from the text the IR printer produces. A shader starts with
// `shader <stage>` and holds `entry` or `func` bodies made of labelled blocks, one
// instruction per line. Operands use the printer's syntax: `%N` SSA values with optional
// `:chans` and `@bits`, class-prefixed hardware registers (`r4`, `vi0`, `sc32`), hex or
// decimal immediates, `ioN` slots, `pN` predicates and `drcN` counters, each followed by
// dotted source modifiers. It exists so tests and the command-line driver can feed
// hand-written shaders through the pipeline without a front end.

//! Textual PCO IR.
//!
//! ```text
//! shader vertex
//! entry main {
//! b0:
//!     %0 = fadd vi0, vi1.neg    ; comment
//!     uvsw.write %0, io0
//! }
//! ```

mod parser;

pub use parser::parse_shader;
