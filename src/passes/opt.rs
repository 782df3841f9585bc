// Local optimizer. One call runs five rewrites over every function, in order:
//
// 1. modifier preparation folds neg/abs/flr pseudo-ops into the operand slot of the single
//    fadd/fmul reading their result, swapping the commutative operands when only the other
//    slot can encode the modifier, and queues every modifier it could not place;
// 2. backward propagation retargets a producer onto the destination of the modifier-free
//    mov that is its only reader and deletes the mov;
// 3. forward propagation replaces reads of a plain mov's result with the mov's source,
//    composing the reference modifiers when the reading slot can encode them;
// 4. component propagation replaces uses of a comp of a hardware register vector with a
//    narrowed view of that register and deletes the comp;
// 5. modifier lowering turns the queued pseudo-ops into real movs or `fadd x, 0`.
//
// Rewrites that cannot be proven safe are skipped. Any hardware register read or written
// across the span of a rewrite blocks it, since only SSA values are immutable.

//! Copy propagation and reference-modifier folding.

use crate::core::BitSet;
use crate::ir::{Builder, Cursor, Function, InstrId, Op, Ref, RefKind, RefMods, RegClass, Shader};

/// Definition site and read count of every SSA value in a function.
struct DefUse {
    defs: Vec<Option<InstrId>>,
    uses: Vec<u32>,
}

impl DefUse {
    fn compute(func: &Function) -> Self {
        let n = func.next_ssa as usize;
        let mut defs = vec![None; n];
        let mut uses = vec![0; n];
        for id in func.instr_ids() {
            let instr = func.instr(id);
            for ssa in instr.ssa_dests() {
                if let Some(def) = defs.get_mut(ssa as usize) {
                    *def = Some(id);
                }
            }
            for ssa in instr.ssa_srcs() {
                if let Some(count) = uses.get_mut(ssa as usize) {
                    *count += 1;
                }
            }
        }
        Self { defs, uses }
    }

    fn def(&self, ssa: u32) -> Option<InstrId> {
        self.defs.get(ssa as usize).copied().flatten()
    }

    fn uses(&self, ssa: u32) -> u32 {
        self.uses.get(ssa as usize).copied().unwrap_or(0)
    }
}

/// The reference modifier a modifier pseudo-op applies.
fn modifier_of(op: Op) -> Option<RefMods> {
    let mut mods = RefMods::NONE;
    match op {
        Op::Neg => mods.neg = true,
        Op::Abs => mods.abs = true,
        Op::Flr => mods.flr = true,
        _ => return None,
    }
    Some(mods)
}

/// Whether an instruction strictly between `from` and `to` (same block)
/// writes a register overlapping `reg`, or also reads one if `reads` is set.
/// Reaching the end of the block without meeting `to` counts as touched.
fn reg_touched_between(func: &Function, from: InstrId, to: InstrId, reg: &Ref, reads: bool) -> bool {
    let mut cursor = func.next_instr(from);
    while let Some(id) = cursor {
        if id == to {
            return false;
        }
        let instr = func.instr(id);
        if instr.dests.iter().any(|d| d.overlaps(reg)) {
            return true;
        }
        if reads && instr.srcs.iter().any(|s| s.overlaps(reg)) {
            return true;
        }
        cursor = func.next_instr(id);
    }
    true
}

fn prep_mods(func: &mut Function) -> (bool, Vec<InstrId>) {
    let du = DefUse::compute(func);
    let mut progress = false;
    let mut queued = Vec::new();

    for id in func.instr_ids() {
        let Some(modifier) = modifier_of(func.instr(id).op) else {
            continue;
        };
        if absorb_modifier(func, &du, id, modifier) {
            progress = true;
        } else {
            queued.push(id);
        }
    }

    (progress, queued)
}

fn absorb_modifier(func: &mut Function, du: &DefUse, id: InstrId, modifier: RefMods) -> bool {
    let instr = func.instr(id);
    let (dest, src) = (instr.dests[0], instr.srcs[0]);
    let Some(ssa) = dest.as_ssa() else {
        return false;
    };
    if du.uses(ssa) != 1 || !matches!(src.kind, RefKind::Ssa(_) | RefKind::Reg(..)) {
        return false;
    }

    let mut cursor = func.next_instr(id);
    let consumer = loop {
        let Some(next) = cursor else {
            return false;
        };
        if func.instr(next).ssa_srcs().any(|s| s == ssa) {
            break next;
        }
        cursor = func.next_instr(next);
    };
    if src.is_reg() && reg_touched_between(func, id, consumer, &src, false) {
        return false;
    }

    let user = func.instr(consumer);
    if !matches!(user.op, Op::Fadd | Op::Fmul) || user.srcs.len() != 2 {
        return false;
    }
    let slot = if user.srcs[0].as_ssa() == Some(ssa) { 0 } else { 1 };
    let other = 1 - slot;
    if user.srcs[slot].as_ssa() != Some(ssa) || user.srcs[other].as_ssa() == Some(ssa) {
        return false;
    }
    if user.srcs[other].mods.mask().contains(modifier.mask()) {
        return false;
    }

    let Some(inner) = RefMods::compose(src.mods, modifier) else {
        return false;
    };
    let Some(mods) = RefMods::compose(inner, user.srcs[slot].mods) else {
        return false;
    };
    if !src.same_shape(&user.srcs[slot]) {
        return false;
    }

    let mut srcs = user.srcs.clone();
    srcs[slot] = src.with_mods(mods);
    if !user.src_mod_support(slot).contains(mods.mask()) {
        if !user.src_mod_support(other).contains(mods.mask())
            || !user.src_mod_support(slot).contains(srcs[other].mods.mask())
        {
            return false;
        }
        srcs.swap(0, 1);
    }

    log::trace!("opt: absorbed {} into {}", func.instr(id), func.instr(consumer));
    func.instr_mut(consumer).srcs = srcs;
    func.remove_instr(id);
    true
}

fn propagate_backward(func: &mut Function) -> bool {
    let du = DefUse::compute(func);
    let mut multi_use = BitSet::new(func.next_ssa as usize);
    for (ssa, &count) in du.uses.iter().enumerate() {
        if count > 1 {
            multi_use.insert(ssa);
        }
    }

    let mut progress = false;
    for id in func.instr_ids().into_iter().rev() {
        let mov = func.instr(id);
        if mov.op != Op::Mov {
            continue;
        }
        let (dest, src, mods) = (mov.dests[0], mov.srcs[0], mov.mods);
        if src.has_mods() || !src.same_shape(&dest) {
            continue;
        }
        let Some(ssa) = src.as_ssa() else {
            continue;
        };
        if multi_use.contains(ssa as usize) || du.uses(ssa) != 1 {
            continue;
        }
        let Some(producer) = du.def(ssa).filter(|&p| func.contains_instr(p)) else {
            continue;
        };

        let p = func.instr(producer);
        if p.is_pseudo() || p.dests.len() != 1 || p.dests[0].as_ssa() != Some(ssa) {
            continue;
        }
        if func.instr_block(producer) != func.instr_block(id) {
            continue;
        }
        if !p.supports_mods(mods.set_mask()) {
            continue;
        }
        if dest.is_reg() && reg_touched_between(func, producer, id, &dest, true) {
            continue;
        }

        log::trace!("opt: folding {} into {}", func.instr(id), func.instr(producer));
        func.remove_instr(id);
        let p = func.instr_mut(producer);
        p.dests[0] = dest;
        p.mods.merge_set(&mods);
        progress = true;
    }

    progress
}

fn propagate_forward(func: &mut Function) -> bool {
    let du = DefUse::compute(func);
    let mut progress = false;

    for id in func.instr_ids() {
        for slot in 0..func.instr(id).srcs.len() {
            let use_ref = func.instr(id).srcs[slot];
            let Some(def) = use_ref
                .as_ssa()
                .and_then(|ssa| du.def(ssa))
                .filter(|&d| func.contains_instr(d))
            else {
                continue;
            };

            let mov = func.instr(def);
            if mov.op != Op::Mov || !mov.mods.is_default() {
                continue;
            }
            let src = mov.srcs[0];
            if !matches!(src.kind, RefKind::Ssa(_) | RefKind::Reg(..))
                || !src.same_shape(&mov.dests[0])
            {
                continue;
            }
            let Some(mods) = RefMods::compose(src.mods, use_ref.mods) else {
                continue;
            };
            if !func.instr(id).src_mod_support(slot).contains(mods.mask()) {
                continue;
            }
            if src.is_reg()
                && (func.instr_block(def) != func.instr_block(id)
                    || reg_touched_between(func, def, id, &src, false))
            {
                continue;
            }

            log::trace!("opt: forwarding {} into slot {} of {}", src, slot, func.instr(id));
            func.instr_mut(id).srcs[slot] = src.with_mods(mods);
            progress = true;
        }
    }

    progress
}

fn propagate_hw_comps(func: &mut Function) -> bool {
    let mut progress = false;

    for id in func.instr_ids() {
        let comp = func.instr(id);
        if comp.op != Op::Comp {
            continue;
        }
        let (dest, vec) = (comp.dests[0], comp.srcs[0]);
        let (Some(ssa), Some(offset)) = (dest.as_ssa(), comp.srcs[1].as_imm()) else {
            continue;
        };
        if !vec.is_reg() || vec.has_mods() {
            continue;
        }
        let Some(view) = vec.reg_view(offset, dest.chans) else {
            continue;
        };

        let block = func.instr_block(id);
        let users: Vec<InstrId> = func
            .instr_ids()
            .into_iter()
            .filter(|&u| func.instr(u).ssa_srcs().any(|s| s == ssa))
            .collect();
        if users.iter().any(|&u| func.instr_block(u) != block) {
            continue;
        }
        if let Some(&last) = users.last() {
            if reg_touched_between(func, id, last, &view, false) {
                continue;
            }
        }

        for user in users {
            let instr = func.instr_mut(user);
            let phi_values = instr.phi_srcs.iter_mut().map(|p| &mut p.value);
            for src in instr.srcs.iter_mut().chain(phi_values) {
                if src.as_ssa() == Some(ssa) {
                    *src = Ref {
                        mods: src.mods,
                        elem: src.elem,
                        ..view
                    };
                }
            }
        }

        log::trace!("opt: comp of {} replaced by {}", vec, view);
        func.remove_instr(id);
        progress = true;
    }

    progress
}

fn lower_mods(func: &mut Function, queued: Vec<InstrId>) -> bool {
    let mov_support = Op::Mov.info().src_mods[0];
    let zero = Ref::hwreg(RegClass::Const, 0);
    let mut progress = false;

    for id in queued {
        if !func.contains_instr(id) {
            continue;
        }
        let instr = func.instr(id);
        let Some(modifier) = modifier_of(instr.op) else {
            continue;
        };
        let (dest, src) = (instr.dests[0], instr.srcs[0]);

        let composed = RefMods::compose(src.mods, modifier);
        if composed.is_none() && !mov_support.contains(src.mods.mask()) {
            log::warn!("opt: cannot lower {}", func.instr(id));
            continue;
        }

        {
            let mut b = Builder::new(func, Cursor::BeforeInstr(id));
            match composed {
                Some(mods) if mov_support.contains(mods.mask()) => {
                    b.mov(dest, src.with_mods(mods));
                }
                Some(mods) => {
                    b.fadd(dest, src.with_mods(mods), zero);
                }
                // Floor has to apply after the source's own modifiers.
                None => {
                    let tmp = b.new_ssa(dest.bits, dest.chans);
                    b.mov(tmp, src);
                    b.fadd(dest, tmp.with_mods(modifier), zero);
                }
            }
        }
        func.remove_instr(id);
        progress = true;
    }

    progress
}

/// Run one round of the optimizer over every function. Returns whether
/// anything changed.
pub fn run(shader: &mut Shader) -> bool {
    let mut progress = false;

    for func in &mut shader.functions {
        let before = func.num_instrs();
        let (absorbed, queued) = prep_mods(func);
        let backward = propagate_backward(func);
        let forward = propagate_forward(func);
        let comps = propagate_hw_comps(func);
        let lowered = lower_mods(func, queued);

        log::debug!(
            "opt: {} absorbed={} backward={} forward={} comps={} lowered={} ({} -> {} instrs)",
            func.name,
            absorbed,
            backward,
            forward,
            comps,
            lowered,
            before,
            func.num_instrs()
        );
        progress |= absorbed || backward || forward || comps || lowered;
    }

    progress
}

/// Lower every `neg`/`abs`/`flr` pseudo-op in place without folding any of
/// them. Used when the optimizer is disabled, since grouping cannot encode
/// the pseudo-ops.
pub fn lower(shader: &mut Shader) -> bool {
    let mut progress = false;

    for func in &mut shader.functions {
        let queued: Vec<InstrId> = func
            .instr_ids()
            .into_iter()
            .filter(|&id| modifier_of(func.instr(id).op).is_some())
            .collect();
        if queued.is_empty() {
            continue;
        }
        let count = queued.len();
        let lowered = lower_mods(func, queued);
        log::debug!("opt: {} lowered {} pseudo-ops", func.name, count);
        progress |= lowered;
    }

    progress
}
