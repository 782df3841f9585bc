// This module finalizes the end of the shader before register allocation. The hardware stops
// at the first group whose end flag is set, so the entrypoint must carry exactly one, on its
// last instruction. Vertex shaders also have to terminate their task explicitly. Later passes
// that append code after the end-flagged instruction move the flag along with it.

//! End-of-shader finalization.
//!
//! Leaves exactly one instruction carrying the `end` flag, the last one of
//! the entrypoint's last block. Vertex shaders first get their task
//! terminated, by fusing a trailing plain `uvsw.write` into
//! `uvsw.writeendtask` or by appending `uvsw.endtask`.

use crate::core::{CompileError, CompileResult};
use crate::ir::{Builder, ExecCnd, Instr, ModMask, Op, Shader, Stage};

/// Finalize the entrypoint. Returns whether the IR changed.
pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let stage = shader.stage;
    let func = shader.entrypoint_mut().ok_or(CompileError::NoEntrypoint)?;
    let Some(&block) = func.block_order().last() else {
        return Err(CompileError::EmptyFunction {
            name: func.name.clone(),
        });
    };

    let mut progress = false;
    for id in func.instr_ids() {
        let instr = func.instr_mut(id);
        if instr.mods.end {
            log::warn!("end: clearing stray end flag on {}", instr.op.name());
            instr.mods.end = false;
            progress = true;
        }
    }

    if stage == Stage::Vertex {
        let fusable = func.last_instr().filter(|&id| {
            let instr = func.instr(id);
            instr.op == Op::UvswWrite && instr.mods.exec_cnd == ExecCnd::E1Zx && instr.mods.rpt == 1
        });

        match fusable {
            Some(id) => {
                let srcs = func.instr(id).srcs.clone();
                log::debug!("end: fusing {} into {}", func.instr(id), Op::UvswWriteEndTask.name());
                func.replace_instr(id, Instr::new(Op::UvswWriteEndTask, Vec::new(), srcs));
            }
            None => {
                log::debug!("end: appending {}", Op::UvswEndTask.name());
                Builder::at_end(func, block).uvsw_endtask();
            }
        }
        progress = true;
    }

    match func.last_instr() {
        Some(id) if func.instr(id).supports_mods(ModMask::END) => {
            if !func.instr(id).mods.end {
                func.instr_mut(id).mods.end = true;
                progress = true;
            }
        }
        _ => {
            let nop = Builder::at_end(func, block).nop();
            func.instr_mut(nop).mods.end = true;
            progress = true;
        }
    }

    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{lines, shader};

    fn end_count(s: &Shader) -> usize {
        crate::core::test_utils::test::instrs(s)
            .iter()
            .filter(|i| i.mods.end)
            .count()
    }

    #[test]
    fn test_sets_end_on_capable_instruction() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 r0 = fadd r1, r2
             }",
        );
        assert!(run(&mut s).unwrap());
        assert_eq!(lines(&s), vec!["r0 = fadd.end r1, r2"]);
        assert!(!run(&mut s).unwrap());
        assert_eq!(end_count(&s), 1);
    }

    #[test]
    fn test_appends_nop_when_last_cannot_end() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 st drc0, r0, r1
             }",
        );
        run(&mut s).unwrap();
        assert_eq!(lines(&s), vec!["st drc0, r0, r1", "nop.end"]);
    }

    #[test]
    fn test_vertex_fuses_plain_write() {
        let mut s = shader(
            "shader vertex
             entry main {
             b0:
                 uvsw.write r0, io3
             }",
        );
        run(&mut s).unwrap();
        assert_eq!(lines(&s), vec!["uvsw.writeendtask r0, io3", "nop.end"]);
    }

    #[test]
    fn test_vertex_repeated_write_gets_separate_endtask() {
        let mut s = shader(
            "shader vertex
             entry main {
             b0:
                 uvsw.write.rpt2 r0:2, io0
             }",
        );
        run(&mut s).unwrap();
        assert_eq!(
            lines(&s),
            vec!["uvsw.write.rpt2 r0:2, io0", "uvsw.endtask", "nop.end"]
        );
        assert_eq!(end_count(&s), 1);
    }

    #[test]
    fn test_empty_block_and_missing_blocks() {
        let mut s = shader(
            "shader compute
             entry main {
             b0:
             }",
        );
        run(&mut s).unwrap();
        assert_eq!(lines(&s), vec!["nop.end"]);

        let mut s = Shader::new("empty", Stage::Fragment);
        s.add_function(crate::ir::Function::new("main", crate::ir::FuncKind::Entrypoint));
        assert!(matches!(run(&mut s), Err(CompileError::EmptyFunction { .. })));

        let mut s = Shader::new("none", Stage::Fragment);
        assert_eq!(run(&mut s), Err(CompileError::NoEntrypoint));
    }
}
