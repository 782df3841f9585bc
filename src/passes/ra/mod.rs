// Register allocation for the entrypoint function. The allocator first coalesces vector
// pseudo-ops: walking vec instructions backwards it places each modifier-free SSA source
// inside the vector's storage, and walking comp instructions forwards it places each
// extracted scalar inside its source vector, so that most vec/comp instructions need no
// data movement at all. Each remaining representative gets an allocation class by channel
// count, live ranges come from one forward scan, every overlapping pair of ranges becomes
// an interference edge, and the graph is colored greedily around the temp registers the
// input already names. The rewrite then replaces SSA
// operands with temp registers, materializes copies for vec sources that could not be
// coalesced and comps whose result lives elsewhere, and deletes the pseudo-ops.

//! Graph-coloring register allocation.

pub mod coloring;
pub mod liveness;
pub mod overrides;

use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashMap;
use std::ops::Range;

use crate::core::{BitSet, CompilationSession, CompileError, CompileResult, Unsupported};
use crate::ir::{
    Bits, Builder, Cursor, Function, InstrId, Op, Ref, RefKind, RegClass, Shader,
};

pub use coloring::{color, AllocClass, Coloring, InterferenceGraph};
pub use liveness::{compute_live_ranges, LiveRange};
pub use overrides::{Override, StorageOverrides};

/// Reject input shapes the allocator does not handle and report whether
/// there is anything to allocate.
fn check_function(func: &Function) -> CompileResult<bool> {
    if func.has_control_flow() {
        return Err(Unsupported::ControlFlow.into());
    }

    let mut has_ssa_dests = false;
    for id in func.instr_ids() {
        let instr = func.instr(id);
        if instr.op == Op::Phi || !instr.phi_srcs.is_empty() {
            return Err(Unsupported::ControlFlow.into());
        }
        for r in instr.dests.iter().chain(instr.srcs.iter()) {
            if r.is_ssa() && r.bits != Bits::B32 {
                return Err(Unsupported::MixedBitWidth {
                    found: r.bits.bits(),
                }
                .into());
            }
        }
        has_ssa_dests |= instr.ssa_dests().next().is_some();
    }
    Ok(has_ssa_dests)
}

fn coalesce_vecs(func: &Function, overrides: &mut StorageOverrides) {
    for id in func.instr_ids().into_iter().rev() {
        let instr = func.instr(id);
        if instr.op != Op::Vec {
            continue;
        }
        let dest = instr.dests[0];
        let Some(base) = dest.as_ssa() else {
            continue;
        };

        let mut offset = 0u32;
        for src in &instr.srcs {
            let chans = src.chans as u32;
            if let Some(ssa) = src.as_ssa() {
                let fits = offset + chans <= dest.chans as u32;
                if fits
                    && !src.has_mods()
                    && !overrides.is_overridden(ssa)
                    && overrides.resolve(base).0 != ssa
                {
                    overrides.set(ssa, base, offset);
                }
            }
            offset += chans;
        }
    }
}

fn coalesce_comps(func: &Function, overrides: &mut StorageOverrides) {
    for id in func.instr_ids() {
        let instr = func.instr(id);
        if instr.op != Op::Comp {
            continue;
        }
        let (dest, vec) = (instr.dests[0], instr.srcs[0]);
        let (Some(ssa), Some(base), Some(offset)) =
            (dest.as_ssa(), vec.as_ssa(), instr.srcs[1].as_imm())
        else {
            continue;
        };
        if vec.has_mods() || offset + dest.chans as u32 > vec.chans as u32 {
            continue;
        }
        if !overrides.is_overridden(ssa) && overrides.resolve(base).0 != ssa {
            overrides.set(ssa, base, offset);
        }
    }
}

/// Widest footprint each SSA value is referenced with.
fn value_chans(func: &Function) -> HashMap<u32, u8> {
    let mut chans: HashMap<u32, u8> = HashMap::new();
    for id in func.instr_ids() {
        let instr = func.instr(id);
        for r in instr.dests.iter().chain(instr.srcs.iter()) {
            if let Some(ssa) = r.as_ssa() {
                let entry = chans.entry(ssa).or_insert(r.chans);
                *entry = (*entry).max(r.chans);
            }
        }
    }
    chans
}

/// Temp registers the input already reads or writes. They belong to the front
/// end, so no SSA value may be placed on them.
fn reserved_temps(func: &Function, num_temps: u32) -> BitSet {
    let mut reserved = BitSet::new(num_temps as usize);
    for id in func.instr_ids() {
        let instr = func.instr(id);
        for r in instr.dests.iter().chain(instr.srcs.iter()) {
            if let RefKind::Reg(RegClass::Temp, index) = r.kind {
                reserved.insert_range(index as usize, r.chans as usize);
            }
        }
    }
    reserved
}

struct Assignment {
    overrides: StorageOverrides,
    coloring: Coloring,
}

impl Assignment {
    fn reg(&mut self, ssa: u32) -> u32 {
        let (rep, offset) = self.overrides.resolve(ssa);
        // Every representative is a graph node and was colored.
        self.coloring.reg(rep).unwrap_or(0) + offset
    }

    fn rewrite(&mut self, r: Ref) -> Ref {
        match r.kind {
            RefKind::Ssa(ssa) => Ref {
                kind: RefKind::Reg(RegClass::Temp, self.reg(ssa)),
                ..r
            },
            _ => r,
        }
    }
}

/// Copy `src` into `dest`, picking an op that can encode the source.
fn emit_copy(b: &mut Builder<'_>, dest: Ref, src: Ref) {
    if let Some(value) = src.as_imm() {
        b.movi32(dest, value);
    } else if Op::Mov.info().src_mods[0].contains(src.mods.mask()) {
        b.mov(dest, src);
    } else {
        b.fadd(dest, src, Ref::hwreg(RegClass::Const, 0));
    }
}

fn rewrite_vec(func: &mut Function, id: InstrId, assignment: &mut Assignment) {
    let instr = func.instr(id).clone();
    let base = match instr.dests[0].as_ssa() {
        Some(ssa) => assignment.reg(ssa),
        None => match instr.dests[0].as_reg() {
            Some((_, index)) => index,
            None => return,
        },
    };
    let class = instr.dests[0].as_reg().map_or(RegClass::Temp, |(c, _)| c);

    let mut b = Builder::new(func, Cursor::BeforeInstr(id));
    let mut offset = 0;
    for src in instr.srcs {
        let target = base + offset;
        offset += src.chans as u32;
        if let Some(ssa) = src.as_ssa() {
            if class == RegClass::Temp && !src.has_mods() && assignment.reg(ssa) == target {
                continue;
            }
        }
        let dest = Ref::hwreg_vec(class, target, src.chans);
        emit_copy(&mut b, dest, assignment.rewrite(src));
    }
    func.remove_instr(id);
}

fn rewrite_comp(func: &mut Function, id: InstrId, assignment: &mut Assignment) {
    let instr = func.instr(id).clone();
    let dest = assignment.rewrite(instr.dests[0]);
    let vec = assignment.rewrite(instr.srcs[0]);
    let offset = instr.srcs[1].as_imm().unwrap_or(0);

    if let (Some((class, index)), Some(_)) = (vec.as_reg(), dest.as_reg()) {
        let view = Ref {
            kind: RefKind::Reg(class, index + offset),
            chans: dest.chans,
            ..vec
        };
        if view.without_mods() != dest.without_mods() {
            Builder::new(func, Cursor::BeforeInstr(id)).mov(dest, view);
        }
    }
    func.remove_instr(id);
}

/// Registers decided for a function, before any instruction is rewritten.
pub struct Plan<'arena> {
    pub overrides: StorageOverrides,
    pub ranges: BumpVec<'arena, LiveRange>,
    /// Widest channel count of each SSA value.
    pub chans: HashMap<u32, u8>,
    /// Temps the input names directly.
    pub reserved: BitSet,
    pub coloring: Coloring,
    pub temps: u32,
}

impl Plan<'_> {
    /// Registers occupied by representative `value`.
    pub fn run_of(&self, value: u32) -> Option<Range<u32>> {
        let first = self.coloring.reg(value)?;
        let width = self.chans.get(&value).copied().unwrap_or(1) as u32;
        Some(first..first + width)
    }
}

/// Decide a register for every SSA value of `func` without changing it.
/// Returns `None` when the function defines no SSA values.
pub fn plan<'arena>(
    func: &Function,
    session: &CompilationSession<'arena>,
) -> CompileResult<Option<Plan<'arena>>> {
    if !check_function(func)? {
        return Ok(None);
    }
    let num_temps = session.options().num_temps;

    let mut overrides = StorageOverrides::new(func.next_ssa);
    coalesce_vecs(func, &mut overrides);
    coalesce_comps(func, &mut overrides);

    let chans = value_chans(func);
    let ranges = compute_live_ranges(func, &mut overrides, session.arena());

    let mut classes: Vec<AllocClass> = Vec::new();
    let mut class_of_chans: HashMap<u8, usize> = HashMap::new();
    let mut graph = InterferenceGraph::new();
    for range in ranges.iter() {
        let width = chans.get(&range.value).copied().unwrap_or(1);
        let class = *class_of_chans.entry(width).or_insert_with(|| {
            classes.push(AllocClass::new(width, num_temps));
            classes.len() - 1
        });
        graph.add_node(range.value, class);
    }
    for (i, a) in ranges.iter().enumerate() {
        for b in ranges[i + 1..].iter() {
            if a.overlaps(b) {
                graph.add_edge(a.value, b.value);
            }
        }
    }
    log::debug!(
        "ra: {} has {} values ({} coalesced), {} interferences",
        func.name,
        graph.num_nodes(),
        overrides.count(),
        graph.num_edges()
    );

    let reserved = reserved_temps(func, num_temps);
    if reserved.count() > 0 {
        log::debug!("ra: {} reserves {} input temps", func.name, reserved.count());
    }
    let coloring = color(&graph, &classes, &reserved)?;
    let temps = coloring
        .iter()
        .map(|(value, reg)| reg + chans.get(&value).copied().unwrap_or(1) as u32)
        .max()
        .unwrap_or(0);

    Ok(Some(Plan {
        overrides,
        ranges,
        chans,
        reserved,
        coloring,
        temps,
    }))
}

fn allocate_function(func: &mut Function, session: &CompilationSession) -> CompileResult<bool> {
    let Some(plan) = plan(func, session)? else {
        log::debug!("ra: {} has no SSA values", func.name);
        return Ok(false);
    };
    let temps = plan.temps;
    session.record_allocation(plan.ranges.len(), plan.overrides.count(), temps);

    let mut assignment = Assignment {
        overrides: plan.overrides,
        coloring: plan.coloring,
    };
    for id in func.instr_ids() {
        match func.instr(id).op {
            Op::Vec => rewrite_vec(func, id, &mut assignment),
            Op::Comp => rewrite_comp(func, id, &mut assignment),
            _ => {
                let instr = func.instr(id).clone();
                let dests = instr.dests.iter().map(|&d| assignment.rewrite(d)).collect();
                let srcs = instr.srcs.iter().map(|&s| assignment.rewrite(s)).collect();
                let instr = func.instr_mut(id);
                instr.dests = dests;
                instr.srcs = srcs;
            }
        }
    }

    func.temps = temps;
    log::debug!("ra: {} uses {} temps", func.name, temps);
    Ok(true)
}

/// Allocate registers for the shader's entrypoint. Returns whether anything
/// was allocated.
pub fn run(shader: &mut Shader, session: &CompilationSession) -> CompileResult<bool> {
    if shader.functions.len() > 1 {
        return Err(Unsupported::MultiFunctionCallGraph.into());
    }
    let func = shader.entrypoint_mut().ok_or(CompileError::NoEntrypoint)?;
    let progress = allocate_function(func, session)?;
    let temps = func.temps;
    shader.data.temps = shader.data.temps.max(temps);
    Ok(progress)
}
