// Instruction grouping. After register allocation every instruction is wrapped in its own
// instruction group: the op lands in the phase its OpInfo names, register sources are
// routed to the lower (s0..s2) or upper (s3..s5) source bank depending on which part of the
// ALU reads them, and register destinations go to the W0/W1 write slots. From the populated
// fields the pass picks the header, source and destination encoding variants, adds up the
// byte lengths of every part, pads the group to a whole 16-bit word and derives the
// decode-assist hint. Offsets run contiguously through each function. Finally the last
// group of every function is padded so that both its offset and its size are multiples of
// the instruction cache alignment, growing the group before it when the offset is off.

//! Packing of instructions into instruction groups.

use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{
    AluType, Cursor, DestVariant, ExecCnd, Function, HdrVariant, Igrp, Instr, Phase, Ref,
    Shader, SrcSize, SrcSlot, SrcVariant,
};

/// Encoded source-bank length by source count and widest source.
const SRC_LEN: [[u32; 3]; 3] = [[1, 2, 3], [2, 3, 4], [4, 5, 6]];

fn hdr_variant(alu: AluType, instr: &Instr) -> HdrVariant {
    let m = &instr.mods;
    match alu {
        AluType::Main if m.rpt > 1 || m.exec_cnd != ExecCnd::E1Zx => HdrVariant::MainExt,
        AluType::Main if m.end || m.olchk || m.atom => HdrVariant::Main,
        AluType::Main => HdrVariant::MainBrief,
        AluType::Bitwise if m.rpt > 1 => HdrVariant::BitwiseExt,
        AluType::Bitwise => HdrVariant::Bitwise,
        AluType::Control => HdrVariant::Control,
    }
}

fn hdr_len(variant: HdrVariant) -> u32 {
    match variant {
        HdrVariant::MainBrief => 2,
        HdrVariant::Main | HdrVariant::Bitwise | HdrVariant::Control => 3,
        HdrVariant::MainExt | HdrVariant::BitwiseExt => 4,
    }
}

fn src_size(r: &Ref) -> SrcSize {
    match r.as_reg() {
        Some((class, index)) if index < 32 && class.has_short_encoding() => SrcSize::Short,
        Some((_, index)) if index < 256 => SrcSize::Long,
        _ => SrcSize::Ext,
    }
}

fn src_variant(srcs: &[Option<Ref>; 3]) -> Option<SrcVariant> {
    let count = srcs.iter().flatten().count();
    let size = srcs.iter().flatten().map(src_size).max()?;
    Some(SrcVariant {
        count: count as u8,
        size,
    })
}

fn src_len(variant: Option<SrcVariant>) -> u32 {
    variant.map_or(0, |v| SRC_LEN[v.count as usize - 1][v.size as usize])
}

fn dest_variant(dests: &[Option<Ref>; 2]) -> Option<DestVariant> {
    let count = dests.iter().flatten().count();
    if count == 0 {
        return None;
    }
    let long = dests
        .iter()
        .flatten()
        .any(|d| src_size(d) != SrcSize::Short);
    Some(DestVariant {
        count: count as u8,
        long,
    })
}

fn dest_len(variant: Option<DestVariant>) -> u32 {
    variant.map_or(0, |v| v.count as u32 + v.long as u32)
}

/// Wrap one allocated instruction into a group, with lengths computed.
fn build_igrp(instr: Instr) -> CompileResult<Igrp> {
    let info = instr.info();
    let op = info.name;
    if let Some(ssa) = instr
        .dests
        .iter()
        .chain(instr.srcs.iter())
        .find_map(|r| r.as_ssa())
    {
        return Err(CompileError::UnallocatedSsa { ssa });
    }
    let (Some(alu), Some(phase)) = (info.alu, info.phase) else {
        return Err(CompileError::UngroupableOp { op });
    };

    let mut igrp = Igrp::new(alu);
    igrp.hdr.end = instr.mods.end;
    igrp.hdr.olchk = instr.mods.olchk;
    igrp.hdr.atom = instr.mods.atom;
    igrp.hdr.rpt = instr.mods.rpt;
    igrp.hdr.exec_cnd = instr.mods.exec_cnd;

    let reg_srcs: Vec<Ref> = instr.srcs.iter().filter(|s| s.is_reg()).copied().collect();
    if reg_srcs.len() > 3 {
        return Err(CompileError::TooManySources {
            op,
            count: reg_srcs.len(),
        });
    }
    let uses_iss = alu == AluType::Main && phase != Phase::P0;
    match (alu, phase) {
        (AluType::Control, _) => {}
        (AluType::Main, Phase::Backend) => {
            for (i, src) in reg_srcs.into_iter().enumerate() {
                igrp.upper_srcs[i] = Some(src);
                if uses_iss {
                    igrp.iss.push(SrcSlot::Upper(i as u8));
                }
            }
        }
        _ => {
            for (i, src) in reg_srcs.into_iter().enumerate() {
                igrp.lower_srcs[i] = Some(src);
                if uses_iss {
                    igrp.iss.push(SrcSlot::Lower(i as u8));
                }
            }
        }
    }

    let reg_dests: Vec<Ref> = instr.dests.iter().filter(|d| d.is_reg()).copied().collect();
    if reg_dests.len() > 2 {
        return Err(CompileError::TooManyDests {
            op,
            count: reg_dests.len(),
        });
    }
    for (i, dest) in reg_dests.into_iter().enumerate() {
        igrp.dests[i] = Some(dest);
    }

    igrp.variant.hdr = hdr_variant(alu, &instr);
    igrp.variant.lower_srcs = src_variant(&igrp.lower_srcs);
    igrp.variant.upper_srcs = src_variant(&igrp.upper_srcs);
    igrp.variant.dests = dest_variant(&igrp.dests);

    let enc = &mut igrp.enc;
    enc.hdr = hdr_len(igrp.variant.hdr);
    enc.lower_srcs = src_len(igrp.variant.lower_srcs);
    enc.upper_srcs = src_len(igrp.variant.upper_srcs);
    enc.iss = uses_iss as u32;
    let ext = alu == AluType::Main && phase == Phase::P0 && instr.needs_ext_encoding();
    enc.instrs[phase.index()] = info.enc_len as u32 + ext as u32;
    enc.dests = dest_len(igrp.variant.dests);

    let total = enc.hdr + enc.lower_srcs + enc.upper_srcs + enc.iss + enc.instrs_len() + enc.dests;
    enc.word_padding = total % 2;
    enc.total = total + enc.word_padding;
    igrp.hdr.length = enc.total / 2;

    igrp.hdr.da = match alu {
        AluType::Main => {
            let trailing: u32 = alu
                .phases()
                .iter()
                .filter(|&&p| p != Phase::P0)
                .map(|p| igrp.enc.instrs[p.index()])
                .sum();
            igrp.enc.hdr + trailing
        }
        AluType::Bitwise => igrp.enc.hdr + igrp.enc.instrs_len(),
        AluType::Control if instr.srcs.is_empty() && instr.dests.is_empty() => 0,
        AluType::Control => igrp.enc.hdr + igrp.enc.instrs_len(),
    };

    igrp.instrs[phase.index()] = Some(instr);
    Ok(igrp)
}

/// Pad the function's last group so its offset and size are multiples of
/// `align`.
fn align_last(func: &mut Function, align: u32) {
    let ids = func.igrp_ids();
    let Some(&last) = ids.last() else {
        return;
    };

    let misaligned = func.igrp(last).offset % align;
    if misaligned != 0 && ids.len() >= 2 {
        let pad = align - misaligned;
        func.igrp_mut(ids[ids.len() - 2]).pad(pad);
        func.igrp_mut(last).offset += pad;
    }

    let misaligned = func.igrp(last).enc.total % align;
    if misaligned != 0 {
        func.igrp_mut(last).pad(align - misaligned);
    }
}

fn group_function(func: &mut Function, align: u32) -> CompileResult<usize> {
    let mut index = 0;
    let mut offset = 0;

    for block in func.block_order() {
        let ids: Vec<_> = func.block_instrs(block).collect();
        for id in ids {
            let mut igrp = build_igrp(func.remove_instr(id))?;
            igrp.index = index;
            igrp.offset = offset;
            index += 1;
            offset += igrp.enc.total;
            log::trace!("group: {}", igrp);
            func.insert_igrp(Cursor::AfterBlock(block), igrp);
        }
    }

    align_last(func, align);
    Ok(index as usize)
}

/// Group every function of the shader. One-shot: grouping an already
/// grouped shader is an error.
pub fn run(shader: &mut Shader, session: &CompilationSession) -> CompileResult<bool> {
    if shader.is_grouped {
        return Err(CompileError::AlreadyGrouped);
    }
    let align = session.options().icache_align;

    let mut count = 0;
    for func in &mut shader.functions {
        let groups = group_function(func, align)?;
        log::debug!("group: {} packed into {} groups", func.name, groups);
        count += groups;
    }
    if count == 0 {
        return Err(CompileError::EmptyShader);
    }

    shader.is_grouped = true;
    session.record_grouped(count, shader.code_size());
    Ok(true)
}
