//! Dead-code elimination.
//!
//! An instruction is dead when it has at least one destination, every
//! destination is an SSA value nothing reads, and it has no side effect.
//! Deleting an instruction can make its operands' producers dead, so the
//! pass repeats its sweep until nothing more is removed; a second run on the
//! same IR therefore reports no progress.

use crate::core::CompilationSession;
use crate::ir::{Function, Instr, Shader};

fn is_removable(instr: &Instr, uses: &[u32]) -> bool {
    if instr.dests.is_empty() || instr.has_side_effects() {
        return false;
    }
    instr.dests.iter().all(|dest| {
        dest.as_ssa()
            .is_some_and(|ssa| uses.get(ssa as usize).copied().unwrap_or(0) == 0)
    })
}

fn sweep(func: &mut Function) -> usize {
    let mut uses = vec![0u32; func.next_ssa as usize];
    for id in func.instr_ids() {
        for ssa in func.instr(id).ssa_srcs() {
            if let Some(count) = uses.get_mut(ssa as usize) {
                *count += 1;
            }
        }
    }

    let mut removed = 0;
    for id in func.instr_ids().into_iter().rev() {
        if !is_removable(func.instr(id), &uses) {
            continue;
        }
        let instr = func.remove_instr(id);
        log::trace!("dce: removed {}", instr);
        for ssa in instr.ssa_srcs() {
            if let Some(count) = uses.get_mut(ssa as usize) {
                *count -= 1;
            }
        }
        removed += 1;
    }
    removed
}

/// Remove dead instructions from every function. Returns whether anything
/// was removed.
pub fn run(shader: &mut Shader, session: &CompilationSession) -> bool {
    let mut total = 0;
    for func in &mut shader.functions {
        let mut removed = 0;
        loop {
            let swept = sweep(func);
            if swept == 0 {
                break;
            }
            removed += swept;
        }
        if removed > 0 {
            log::debug!("dce: {} removed {} instructions", func.name, removed);
        }
        total += removed;
    }

    session.record_instrs_removed(total);
    total > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{lines, shader, TestContext};

    #[test]
    fn test_removes_dead_chains() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = fmul r0, r1
                 %1 = fadd %0, r2
                 %2 = fadd r0, r1
                 uvsw.write %2, io0
             }",
        );
        let ctx = TestContext::new();
        ctx.with_session(|session| {
            assert!(run(&mut s, session));
            assert_eq!(lines(&s), vec!["%2 = fadd r0, r1", "uvsw.write %2, io0"]);
            assert!(!run(&mut s, session));
            assert_eq!(session.stats().instrs_removed, 2);
        });
    }

    #[test]
    fn test_keeps_side_effects_and_register_writes() {
        let mut s = shader(
            "shader compute
             entry main {
             b0:
                 %0 = atomic.atom drc0, sh0, r1
                 %1 = atomic drc0, sh1, r1
                 r4 = fadd r0, r1
                 %2 = fitr r0, r1
             }",
        );
        let ctx = TestContext::new();
        ctx.with_session(|session| {
            assert!(run(&mut s, session));
            assert_eq!(
                lines(&s),
                vec![
                    "%0 = atomic.atom drc0, sh0, r1",
                    "r4 = fadd r0, r1",
                ]
            );
        });
    }
}
