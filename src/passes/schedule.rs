// This module inserts the data-fence waits that make DRC reads safe. It runs after register
// allocation, so the counters it sees are final, and before grouping, so every wait becomes
// a group of its own. A wait after the shader's end-flagged instruction would never execute;
// in that case the flag moves onto a `nop` placed after the wait.

//! DRC wait insertion.
//!
//! Every instruction reading a DRC gets a `wdf` on that counter right after
//! it. Only the first DRC source of an instruction is waited on.

use crate::core::CompilationSession;
use crate::ir::{Builder, Cursor, Op, Shader};

/// Insert waits. Returns whether any `wdf` was inserted.
pub fn run(shader: &mut Shader, session: &CompilationSession) -> bool {
    let mut inserted = 0;

    for func in &mut shader.functions {
        for id in func.instr_ids() {
            if func.instr(id).op == Op::Wdf {
                continue;
            }
            let Some(drc) = func.instr(id).srcs.iter().find(|s| s.is_drc()).copied() else {
                continue;
            };
            log::trace!("schedule: wdf {} after {}", drc, func.instr(id));
            let ends = func.instr(id).mods.end;
            if ends {
                func.instr_mut(id).mods.end = false;
            }
            let mut b = Builder::new(func, Cursor::AfterInstr(id));
            b.wdf(drc.without_mods());
            if ends {
                let nop = b.nop();
                b.func().instr_mut(nop).mods.end = true;
            }
            inserted += 1;
        }
    }

    if inserted > 0 {
        log::debug!("schedule: inserted {} waits", inserted);
    }
    session.record_waits_inserted(inserted);
    inserted > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{lines, shader, TestContext};

    #[test]
    fn test_waits_after_first_drc_source_only() {
        let mut s = shader(
            "shader compute
             entry main {
             b0:
                 r0 = ld drc0, sh0
                 r1 = atomic drc1, sh1, drc2
                 r2 = fadd r0, r1
             }",
        );
        let ctx = TestContext::new();
        ctx.with_session(|session| {
            assert!(run(&mut s, session));
            assert_eq!(session.stats().waits_inserted, 2);
        });
        assert_eq!(
            lines(&s),
            vec![
                "r0 = ld drc0, sh0",
                "wdf drc0",
                "r1 = atomic drc1, sh1, drc2",
                "wdf drc1",
                "r2 = fadd r0, r1",
            ]
        );
    }

    #[test]
    fn test_end_flag_moves_past_the_wait() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 r1 = fadd r2, r3
                 r0 = mov.end drc0
             }",
        );
        let ctx = TestContext::new();
        ctx.with_session(|session| assert!(run(&mut s, session)));
        assert_eq!(
            lines(&s),
            vec!["r1 = fadd r2, r3", "r0 = mov drc0", "wdf drc0", "nop.end"]
        );
    }

    #[test]
    fn test_no_drc_no_progress() {
        let mut s = shader(
            "shader compute
             entry main {
             b0:
                 r2 = fadd r0, r1
             }",
        );
        let ctx = TestContext::new();
        assert!(!ctx.with_session(|session| run(&mut s, session)));
    }
}
