// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession is the handle every pass receives: it lends out the arena used for
// pass-local scratch storage (the register allocator's live ranges and interference graph
// live there for the duration of one allocation), carries the Options the pipeline was
// configured with, and accumulates SessionStats behind a RefCell so that passes only need a
// shared reference. SessionStats tracks which passes ran and whether they made progress,
// how many constants were folded and instructions deleted, waits inserted, the peak temp
// count and the size of the grouped stream, and renders a summary through Display.

//! Arena-based compilation session management.

use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;

use super::options::Options;

/// One pipeline stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRun {
    pub name: &'static str,
    pub progress: bool,
}

/// Arena-based compilation session.
///
/// Scratch data allocated through [`CompilationSession::arena`] lives as long
/// as the arena; callers compiling many shaders reset the arena between them.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    options: Options,
    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a session with default options.
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_options(arena, Options::default())
    }

    pub fn with_options(arena: &'arena Bump, options: Options) -> Self {
        Self {
            arena,
            options,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Record that a pass ran and whether it changed anything.
    pub fn record_pass(&self, name: &'static str, progress: bool) {
        let mut stats = self.stats.borrow_mut();
        stats.passes.push(PassRun { name, progress });
        if progress {
            stats.passes_progressed += 1;
        }
    }

    pub fn record_constants_folded(&self, count: usize) {
        self.stats.borrow_mut().constants_folded += count;
    }

    pub fn record_instrs_removed(&self, count: usize) {
        self.stats.borrow_mut().instrs_removed += count;
    }

    pub fn record_waits_inserted(&self, count: usize) {
        self.stats.borrow_mut().waits_inserted += count;
    }

    /// Record a function's allocation result.
    pub fn record_allocation(&self, values: usize, coalesced: usize, temps: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.values_allocated += values;
        stats.values_coalesced += coalesced;
        stats.temps = stats.temps.max(temps);
    }

    pub fn record_grouped(&self, igrps: usize, code_size: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.igrps += igrps;
        stats.code_size += code_size;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Every pass invocation, in order.
    pub passes: Vec<PassRun>,

    /// Invocations that reported progress.
    pub passes_progressed: usize,

    /// `movi32` instructions rewritten into constant-register reads.
    pub constants_folded: usize,

    /// Instructions deleted by dead-code elimination.
    pub instrs_removed: usize,

    /// `wdf` instructions inserted by the scheduler.
    pub waits_inserted: usize,

    /// SSA representatives given a register.
    pub values_allocated: usize,

    /// SSA values placed inside another value's storage.
    pub values_coalesced: usize,

    /// Peak temp registers over all functions.
    pub temps: u32,

    /// Instruction groups emitted.
    pub igrps: usize,

    /// Grouped stream size in bytes.
    pub code_size: u32,
}

impl SessionStats {
    /// Progress flag of the most recent run of `name`.
    pub fn last_run(&self, name: &str) -> Option<bool> {
        self.passes
            .iter()
            .rev()
            .find(|run| run.name == name)
            .map(|run| run.progress)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(
            f,
            "  Passes run: {} ({} made progress)",
            self.passes.len(),
            self.passes_progressed
        )?;
        writeln!(f, "  Constants folded: {}", self.constants_folded)?;
        writeln!(f, "  Instructions removed: {}", self.instrs_removed)?;
        writeln!(f, "  Waits inserted: {}", self.waits_inserted)?;
        writeln!(
            f,
            "  Values allocated: {} ({} coalesced)",
            self.values_allocated, self.values_coalesced
        )?;
        writeln!(f, "  Temps: {}", self.temps)?;
        writeln!(f, "  Instruction groups: {}", self.igrps)?;
        writeln!(f, "  Code size: {} bytes", self.code_size)?;

        if !self.passes.is_empty() {
            writeln!(f, "  Pass log:")?;
            for run in &self.passes {
                writeln!(
                    f,
                    "    {}: {}",
                    run.name,
                    if run.progress { "progress" } else { "no change" }
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert!(stats.passes.is_empty());
        assert_eq!(stats.temps, 0);
        assert_eq!(session.options().num_temps, 248);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_pass("opt", true);
        session.record_pass("dce", false);
        session.record_pass("opt", false);
        session.record_constants_folded(2);
        session.record_allocation(5, 2, 7);
        session.record_allocation(1, 0, 3);
        session.record_grouped(4, 24);

        let stats = session.stats();
        assert_eq!(stats.passes.len(), 3);
        assert_eq!(stats.passes_progressed, 1);
        assert_eq!(stats.last_run("opt"), Some(false));
        assert_eq!(stats.last_run("ra"), None);
        assert_eq!(stats.temps, 7);
        assert_eq!(stats.values_allocated, 6);

        let rendered = stats.to_string();
        assert!(rendered.contains("Constants folded: 2"));
        assert!(rendered.contains("Code size: 24 bytes"));
        assert!(rendered.contains("dce: no change"));
    }
}
