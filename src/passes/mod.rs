// This module holds the backend passes, one submodule per stage, and the driver that runs
// them in pipeline order. Every pass takes the whole shader and reports whether it changed
// anything; passes that can meet an input shape they do not handle return a CompileResult.
// Statistics and per-pass progress go into the CompilationSession so callers can inspect
// what the pipeline did without re-walking the IR.

//! Backend passes and the pipeline driver.

pub mod const_fold;
pub mod dce;
pub mod end;
pub mod group;
pub mod opt;
pub mod ra;
pub mod schedule;

use crate::core::{CompilationSession, CompileResult};
use crate::ir::Shader;

/// Run the full backend pipeline on `shader`.
///
/// On success every instruction has been packed into an instruction group
/// and `shader.data.temps` holds the temp register count.
pub fn compile(shader: &mut Shader, session: &CompilationSession) -> CompileResult<()> {
    let options = session.options();
    options.validate()?;
    log::debug!("compiling {} shader {}", shader.stage.name(), shader.name);

    let progress = const_fold::run(shader, session);
    session.record_pass("const_fold", progress);

    if options.optimize {
        for round in 0..options.opt_rounds {
            let opt_progress = opt::run(shader);
            session.record_pass("opt", opt_progress);
            let dce_progress = dce::run(shader, session);
            session.record_pass("dce", dce_progress);
            if !opt_progress && !dce_progress {
                log::trace!("optimizer settled after {} round(s)", round + 1);
                break;
            }
        }
    } else {
        // Constant folding can still leave pseudo-ops that grouping cannot encode.
        let progress = opt::lower(shader);
        session.record_pass("lower", progress);
    }

    let progress = end::run(shader)?;
    session.record_pass("end", progress);

    let progress = ra::run(shader, session)?;
    session.record_pass("ra", progress);

    let progress = schedule::run(shader, session);
    session.record_pass("schedule", progress);

    let progress = group::run(shader, session)?;
    session.record_pass("group", progress);

    log::debug!(
        "compiled {}: {} groups, {} bytes, {} temps",
        shader.name,
        shader.num_igrps(),
        shader.code_size(),
        shader.data.temps
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::*;
    use crate::core::{CompileError, Options};

    #[test]
    fn test_compile_runs_every_stage() {
        let mut s = shader(
            "shader vertex
             entry main {
             b0:
                 %0 = movi32 0x3f800000
                 %1 = fadd vi0, %0
                 %2 = fmul %1, vi1
                 uvsw.write %2, io0
             }",
        );
        let ctx = TestContext::new();
        let stats = ctx.with_session(|session| {
            compile(&mut s, session).unwrap();
            session.stats()
        });

        assert!(s.is_grouped);
        assert_eq!(s.num_instrs(), 0);
        assert_eq!(
            stats.passes.iter().map(|p| p.name).collect::<Vec<_>>(),
            vec!["const_fold", "opt", "dce", "end", "ra", "schedule", "group"]
        );
        assert_eq!(stats.constants_folded, 1);
        assert_eq!(stats.last_run("end"), Some(true));
    }

    #[test]
    fn test_compile_without_optimizer() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = fadd r0, r1
                 %1 = mov %0
             }",
        );
        let ctx = TestContext::with_options(Options::default().with_optimize(false));
        let stats = ctx.with_session(|session| {
            compile(&mut s, session).unwrap();
            session.stats()
        });
        assert_eq!(stats.last_run("opt"), None);
        assert_eq!(stats.last_run("dce"), None);
        assert_eq!(stats.last_run("lower"), Some(false));
        assert!(s.is_grouped);
    }

    #[test]
    fn test_compile_without_optimizer_lowers_folded_modifiers() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = movi32 0xbf800000
                 %1 = fadd r1, %0
                 r2 = mov %1
             }",
        );
        let ctx = TestContext::with_options(Options::default().with_optimize(false));
        let stats = ctx.with_session(|session| {
            compile(&mut s, session).unwrap();
            session.stats()
        });
        assert_eq!(stats.last_run("lower"), Some(true));
        assert!(s.is_grouped);

        let func = s.entrypoint().unwrap();
        for id in func.igrp_ids() {
            for (_, instr) in func.igrp(id).phases() {
                assert!(!instr.is_pseudo(), "pseudo op grouped: {}", instr);
            }
        }
    }

    #[test]
    fn test_compile_rejects_bad_options() {
        let mut s = shader("shader fragment\nentry main {\nb0:\n}");
        let ctx = TestContext::with_options(Options::default().with_num_temps(0));
        let err = ctx.with_session(|session| compile(&mut s, session)).unwrap_err();
        assert!(matches!(err, CompileError::InvalidOptions { .. }));
        assert!(!s.is_grouped);
    }
}
