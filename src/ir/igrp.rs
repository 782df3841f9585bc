//! Instruction groups, the post-grouping unit of the instruction stream.

use super::instr::{AluType, ExecCnd, Instr, Phase};
use super::refs::Ref;

/// Header shape, picked from the fields a group needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdrVariant {
    #[default]
    MainBrief,
    Main,
    MainExt,
    Bitwise,
    BitwiseExt,
    Control,
}

/// Source-bank encoding width, from the widest source in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SrcSize {
    Short,
    Long,
    Ext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcVariant {
    pub count: u8,
    pub size: SrcSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestVariant {
    pub count: u8,
    pub long: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgrpVariant {
    pub hdr: HdrVariant,
    pub lower_srcs: Option<SrcVariant>,
    pub upper_srcs: Option<SrcVariant>,
    pub dests: Option<DestVariant>,
}

/// Source slot routed into a phase through the internal source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcSlot {
    Lower(u8),
    Upper(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgrpHeader {
    pub alu: AluType,
    /// Group length in 16-bit units.
    pub length: u32,
    /// Decode-assist hint.
    pub da: u32,
    pub end: bool,
    pub olchk: bool,
    pub atom: bool,
    pub rpt: u8,
    pub exec_cnd: ExecCnd,
}

/// Encoded byte lengths of each part of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgrpEnc {
    pub hdr: u32,
    pub lower_srcs: u32,
    pub upper_srcs: u32,
    pub iss: u32,
    pub instrs: [u32; Phase::COUNT],
    pub dests: u32,
    pub word_padding: u32,
    pub align_padding: u32,
    pub total: u32,
}

impl IgrpEnc {
    pub fn instrs_len(&self) -> u32 {
        self.instrs.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Igrp {
    /// Position of the group within its function.
    pub index: u32,
    /// Byte offset of the group within its function's stream.
    pub offset: u32,
    pub hdr: IgrpHeader,
    pub instrs: [Option<Instr>; Phase::COUNT],
    pub lower_srcs: [Option<Ref>; 3],
    pub upper_srcs: [Option<Ref>; 3],
    pub iss: Vec<SrcSlot>,
    pub dests: [Option<Ref>; 2],
    pub variant: IgrpVariant,
    pub enc: IgrpEnc,
}

impl Igrp {
    pub fn new(alu: AluType) -> Self {
        Self {
            index: 0,
            offset: 0,
            hdr: IgrpHeader {
                alu,
                length: 0,
                da: 0,
                end: false,
                olchk: false,
                atom: false,
                rpt: 1,
                exec_cnd: ExecCnd::E1Zx,
            },
            instrs: Default::default(),
            lower_srcs: [None; 3],
            upper_srcs: [None; 3],
            iss: Vec::new(),
            dests: [None; 2],
            variant: IgrpVariant::default(),
            enc: IgrpEnc::default(),
        }
    }

    pub fn instr(&self, phase: Phase) -> Option<&Instr> {
        self.instrs[phase.index()].as_ref()
    }

    /// Populated phases with their instructions, in pipeline order.
    pub fn phases(&self) -> impl Iterator<Item = (Phase, &Instr)> + '_ {
        self.hdr
            .alu
            .phases()
            .iter()
            .filter_map(move |&p| self.instr(p).map(|i| (p, i)))
    }

    /// First byte past this group.
    pub fn end_offset(&self) -> u32 {
        self.offset + self.enc.total
    }

    /// Grow the trailing padding by `bytes`, keeping the length field in sync.
    pub fn pad(&mut self, bytes: u32) {
        self.enc.align_padding += bytes;
        self.enc.total += bytes;
        self.hdr.length = self.enc.total / 2;
    }
}
