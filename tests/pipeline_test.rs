//! End-to-end tests of the backend pipeline on textual shaders.

use bumpalo::Bump;

use pco::core::{CompilationSession, Options};
use pco::ir::{Igrp, Op, RefKind, RegClass};
use pco::passes::{const_fold, dce, end, opt, ra};
use pco::{compile, parse_shader, CompileError, Shader, Unsupported};

const VERTEX: &str = "
shader vertex
entry main {
b0:
    %0 = movi32 0x3f800000
    %1 = fadd vi0, %0
    %2 = fmul %1, vi1
    %3 = ld drc0, sh4
    %4 = fadd %3, %2.neg
    %5:2 = vec %2, %4
    uvsw.write %5:2, io0
    %6 = fadd %4, cf2     ; dead
    uvsw.write %1, io2
}
";

fn parse(src: &str) -> Shader {
    match parse_shader(src) {
        Ok(shader) => shader,
        Err(e) => panic!("failed to parse test shader: {}", e),
    }
}

fn igrps(shader: &Shader) -> Vec<Igrp> {
    let func = shader.entrypoint().unwrap();
    func.igrp_ids().into_iter().map(|id| func.igrp(id).clone()).collect()
}

#[test]
fn test_folded_constant_reaches_fadd() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut shader = parse(
        "shader vertex
         entry main {
         b0:
             %0 = movi32 0x3f800000
             %1 = fadd vi0, %0
             uvsw.write %1, io0
         }",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    compile(&mut shader, &session).unwrap();

    let fadd = igrps(&shader)
        .into_iter()
        .flat_map(|g| g.phases().map(|(_, i)| i.clone()).collect::<Vec<_>>())
        .find(|i| i.op == Op::Fadd)
        .expect("fadd survives the pipeline");
    assert!(fadd
        .srcs
        .iter()
        .any(|s| matches!(s.kind, RefKind::Reg(RegClass::Const, 32))));
    assert!(!igrps(&shader)
        .iter()
        .any(|g| g.phases().any(|(_, i)| i.op == Op::Movi32)));
}

#[test]
fn test_allocation_leaves_only_hardware_registers() {
    let mut shader = parse(VERTEX);
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    const_fold::run(&mut shader, &session);
    opt::run(&mut shader);
    dce::run(&mut shader, &session);
    end::run(&mut shader).unwrap();
    assert!(ra::run(&mut shader, &session).unwrap());

    let func = shader.entrypoint().unwrap();
    let temps = shader.data.temps;
    assert!(temps > 0);
    assert_eq!(func.temps, temps);

    for id in func.instr_ids() {
        let instr = func.instr(id);
        assert!(!matches!(instr.op, Op::Vec | Op::Comp), "pseudo op left: {}", instr);
        for r in instr.dests.iter().chain(instr.srcs.iter()) {
            assert!(!r.is_ssa(), "SSA left in {}", instr);
            if let RefKind::Reg(RegClass::Temp, index) = r.kind {
                assert!(index + r.chans as u32 <= temps, "{} exceeds {} temps", instr, temps);
            }
        }
    }

    let stats = session.stats();
    assert_eq!(stats.temps, temps);
    assert!(stats.values_coalesced >= 2);
}

#[test]
fn test_grouped_stream_is_contiguous_and_aligned() {
    let mut shader = parse(VERTEX);
    let arena = Bump::new();
    let session = CompilationSession::with_options(&arena, Options::default().with_icache_align(8));
    compile(&mut shader, &session).unwrap();

    let groups = igrps(&shader);
    assert!(groups.len() >= 2);
    assert_eq!(shader.num_instrs(), 0);

    let mut offset = 0;
    for (i, group) in groups.iter().enumerate() {
        assert_eq!(group.index as usize, i);
        assert_eq!(group.offset, offset);
        assert_eq!(group.hdr.length * 2, group.enc.total);
        offset = group.end_offset();
    }

    let last = groups.last().unwrap();
    assert_eq!(last.offset % 8, 0);
    assert_eq!(last.end_offset() % 8, 0);
    assert_eq!(shader.code_size(), last.end_offset());

    let stats = session.stats();
    assert_eq!(stats.igrps, groups.len());
    assert_eq!(stats.code_size, shader.code_size());
    assert!(stats.to_string().contains(&format!("Code size: {} bytes", stats.code_size)));
}

#[test]
fn test_exactly_one_end_group_and_it_is_last() {
    for src in [
        VERTEX,
        "shader fragment
         entry main {
         b0:
             %0 = ld drc1, sh0
             st drc0, %0, sh1
         }",
    ] {
        let mut shader = parse(src);
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        compile(&mut shader, &session).unwrap();

        let groups = igrps(&shader);
        let ends: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.hdr.end)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(ends, vec![groups.len() - 1]);
    }
}

#[test]
fn test_drc_reads_are_waited_on() {
    let mut shader = parse(
        "shader fragment
         entry main {
         b0:
             %0 = ld drc1, sh0
             st drc0, %0, sh1
         }",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    compile(&mut shader, &session).unwrap();

    let ops: Vec<Op> = igrps(&shader)
        .iter()
        .flat_map(|g| g.phases().map(|(_, i)| i.op).collect::<Vec<_>>())
        .collect();
    assert_eq!(ops, vec![Op::Ld, Op::Wdf, Op::St, Op::Wdf, Op::Nop]);
    assert_eq!(session.stats().waits_inserted, 2);
}

#[test]
fn test_dce_is_idempotent() {
    let mut shader = parse(VERTEX);
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    assert!(dce::run(&mut shader, &session));
    let after_first = shader.to_string();
    assert!(!dce::run(&mut shader, &session));
    assert_eq!(shader.to_string(), after_first);
    assert!(!after_first.contains("cf2"));
    assert!(after_first.contains("ld drc0, sh4"));
}

#[test]
fn test_optimizer_rounds_stop_when_settled() {
    let mut shader = parse(VERTEX);
    let arena = Bump::new();
    let session = CompilationSession::with_options(&arena, Options::default().with_opt_rounds(8));
    compile(&mut shader, &session).unwrap();

    let stats = session.stats();
    let opt_runs = stats.passes.iter().filter(|p| p.name == "opt").count();
    assert!(opt_runs < 8);
    assert_eq!(stats.last_run("opt"), Some(false));
    assert_eq!(stats.last_run("dce"), Some(false));
}

#[test]
fn test_unsupported_shapes_are_errors() {
    let arena = Bump::new();

    let mut shader = parse(
        "shader compute
         func helper {
         b0:
         }
         entry main {
         b0:
             nop
         }",
    );
    let session = CompilationSession::new(&arena);
    assert_eq!(
        compile(&mut shader, &session),
        Err(CompileError::Unsupported(Unsupported::MultiFunctionCallGraph))
    );

    let mut shader = parse(
        "shader vertex
         entry main {
         b0:
             %0 = fadd vi0, vi1
             br -> b1
         b1:
             %1 = phi %0 <- b0
             uvsw.write %1, io0
         }",
    );
    let session = CompilationSession::with_options(&arena, Options::default().with_optimize(false));
    assert_eq!(
        compile(&mut shader, &session),
        Err(CompileError::Unsupported(Unsupported::ControlFlow))
    );

    let mut shader = parse(
        "shader fragment
         entry main {
         b0:
             %0 = fadd r0, r1
             %1 = fadd r2, r3
             %2 = fadd %0, %1
             st drc0, %2, r4
         }",
    );
    let session = CompilationSession::with_options(&arena, Options::default().with_num_temps(1));
    assert!(matches!(
        compile(&mut shader, &session),
        Err(CompileError::Allocation(_))
    ));
}

#[test]
fn test_end_group_stays_last_after_drc_wait() {
    let mut shader = parse(
        "shader fragment
         entry main {
         b0:
             r0 = mov drc0
         }",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    compile(&mut shader, &session).unwrap();

    let groups = igrps(&shader);
    let ops: Vec<Op> = groups
        .iter()
        .flat_map(|g| g.phases().map(|(_, i)| i.op).collect::<Vec<_>>())
        .collect();
    assert_eq!(ops, vec![Op::Mov, Op::Wdf, Op::Nop]);
    let ends: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| g.hdr.end)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(ends, vec![groups.len() - 1]);
}

#[test]
fn test_overlapping_ranges_get_disjoint_registers() {
    let shader = parse(
        "shader fragment
         entry main {
         b0:
             %0:4 = ld drc0, sh0
             %1 = comp %0:4, 1
             %2 = comp %0:4, 3
             %3 = fadd %1, r3
             %4 = fmul %2, %3
             %5 = fadd %3, %4
             %6:2 = vec %4, %5
             uvsw.write %6:2, io0
             st drc1, %5, sh1
         }",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let func = shader.entrypoint().unwrap();
    let plan = ra::plan(func, &session)
        .unwrap()
        .expect("function defines SSA values");

    assert!(plan.reserved.contains(3));
    let mut overlapping = 0;
    for (i, a) in plan.ranges.iter().enumerate() {
        let run_a = plan.run_of(a.value).expect("every representative is colored");
        assert!(run_a.end <= plan.temps, "%{} {:?} past {} temps", a.value, run_a, plan.temps);
        assert!(!run_a.contains(&3), "%{} {:?} covers input temp r3", a.value, run_a);

        for b in plan.ranges[i + 1..].iter().filter(|b| a.overlaps(b)) {
            overlapping += 1;
            let run_b = plan.run_of(b.value).expect("every representative is colored");
            assert!(
                run_a.end <= run_b.start || run_b.end <= run_a.start,
                "live %{} {:?} and %{} {:?} share registers",
                a.value,
                run_a,
                b.value,
                run_b
            );
        }
    }
    assert!(overlapping > 0);
}

#[test]
fn test_unoptimized_pipeline_lowers_folded_modifiers() {
    let mut shader = parse(
        "shader fragment
         entry main {
         b0:
             %0 = movi32 0xbf800000
             %1 = fadd r1, %0
             r2 = mov %1
         }",
    );
    let arena = Bump::new();
    let session = CompilationSession::with_options(&arena, Options::default().with_optimize(false));
    compile(&mut shader, &session).unwrap();

    assert!(igrps(&shader)
        .iter()
        .all(|g| g.phases().all(|(_, i)| !matches!(i.op, Op::Neg | Op::Abs | Op::Flr))));
    assert_eq!(session.stats().last_run("lower"), Some(true));
}
