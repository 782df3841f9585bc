// Instruction definitions for PCO IR. Op is the closed opcode enumeration; every op has a
// static OpInfo row describing its operand counts, the reference modifiers each source
// slot can encode, the instruction modifiers it accepts, and where it lands when the
// grouping pass packs it into an instruction group (ALU type, phase, base encoding
// length). Pseudo ops (vec, comp, neg, abs, flr, phi) exist only between the front end
// and register allocation and have no phase. Instr carries the operands, modifiers, an
// optional branch target and, for phis, per-predecessor sources.

//! Instructions, opcodes and opcode metadata.

use super::refs::{Ref, RefModMask};
use super::BlockId;

/// ALU an instruction group is issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluType {
    Main,
    Bitwise,
    Control,
}

impl AluType {
    /// Phases available to groups of this ALU type, in pipeline order.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            AluType::Main => &[Phase::P0, Phase::P2Pck, Phase::P2Tst, Phase::Backend],
            AluType::Bitwise => &[Phase::P0, Phase::P1, Phase::P2],
            AluType::Control => &[Phase::Ctrl],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AluType::Main => "main",
            AluType::Bitwise => "bitwise",
            AluType::Control => "control",
        }
    }
}

/// Pipeline slot within an instruction group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Ctrl,
    P0,
    P1,
    P2,
    P2Pck,
    P2Tst,
    Backend,
}

impl Phase {
    pub const COUNT: usize = 7;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Ctrl => "ctrl",
            Phase::P0 => "p0",
            Phase::P1 => "p1",
            Phase::P2 => "p2",
            Phase::P2Pck => "p2_pck",
            Phase::P2Tst => "p2_tst",
            Phase::Backend => "backend",
        }
    }
}

/// Execution condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecCnd {
    #[default]
    E1Zx,
    E1Z1,
    ExZx,
    E1Z0,
}

impl ExecCnd {
    pub fn name(self) -> &'static str {
        match self {
            ExecCnd::E1Zx => "e1_zx",
            ExecCnd::E1Z1 => "e1_z1",
            ExecCnd::ExZx => "ex_zx",
            ExecCnd::E1Z0 => "e1_z0",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "e1_zx" => Some(ExecCnd::E1Zx),
            "e1_z1" => Some(ExecCnd::E1Z1),
            "ex_zx" => Some(ExecCnd::ExZx),
            "e1_z0" => Some(ExecCnd::E1Z0),
            _ => None,
        }
    }
}

/// Set of instruction modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModMask(u8);

impl ModMask {
    pub const NONE: Self = Self(0);
    pub const RPT: Self = Self(1 << 0);
    pub const EXEC_CND: Self = Self(1 << 1);
    pub const END: Self = Self(1 << 2);
    pub const OLCHK: Self = Self(1 << 3);
    pub const ATOM: Self = Self(1 << 4);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ModMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Instruction modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrMods {
    pub rpt: u8,
    pub exec_cnd: ExecCnd,
    pub end: bool,
    pub olchk: bool,
    pub atom: bool,
}

impl Default for InstrMods {
    fn default() -> Self {
        Self {
            rpt: 1,
            exec_cnd: ExecCnd::E1Zx,
            end: false,
            olchk: false,
            atom: false,
        }
    }
}

impl InstrMods {
    /// Modifiers that differ from their defaults.
    pub fn set_mask(&self) -> ModMask {
        let mut mask = ModMask::NONE;
        if self.rpt != 1 {
            mask = mask | ModMask::RPT;
        }
        if self.exec_cnd != ExecCnd::E1Zx {
            mask = mask | ModMask::EXEC_CND;
        }
        if self.end {
            mask = mask | ModMask::END;
        }
        if self.olchk {
            mask = mask | ModMask::OLCHK;
        }
        if self.atom {
            mask = mask | ModMask::ATOM;
        }
        mask
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Copy every non-default modifier of `other` onto `self`.
    pub fn merge_set(&mut self, other: &InstrMods) {
        if other.rpt != 1 {
            self.rpt = other.rpt;
        }
        if other.exec_cnd != ExecCnd::E1Zx {
            self.exec_cnd = other.exec_cnd;
        }
        self.end |= other.end;
        self.olchk |= other.olchk;
        self.atom |= other.atom;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Pseudo ops, gone by the time instructions are grouped.
    Vec,
    Comp,
    Neg,
    Abs,
    Flr,
    Phi,
    // Main ALU.
    Mov,
    Movi32,
    Fadd,
    Fmul,
    Fmad,
    Pck,
    Tst,
    // Backend.
    UvswWrite,
    UvswEndTask,
    UvswWriteEndTask,
    Ld,
    St,
    Fitr,
    Atomic,
    // Bitwise ALU.
    Cbs,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    // Control ALU.
    Nop,
    Wdf,
    Br,
}

/// Static description of an opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub num_dests: u8,
    /// Source count, `!0` for variadic ops.
    pub num_srcs: u8,
    pub src_mods: [RefModMask; 3],
    pub mods: ModMask,
    pub alu: Option<AluType>,
    pub phase: Option<Phase>,
    /// Base encoded length in bytes of the phase instruction.
    pub enc_len: u8,
    pub pseudo: bool,
    pub commutative: bool,
}

const fn op(name: &'static str, num_dests: u8, num_srcs: u8) -> OpInfo {
    OpInfo {
        name,
        num_dests,
        num_srcs,
        src_mods: [RefModMask::NONE; 3],
        mods: ModMask::NONE,
        alu: None,
        phase: None,
        enc_len: 0,
        pseudo: false,
        commutative: false,
    }
}

impl OpInfo {
    const fn pseudo(mut self) -> Self {
        self.pseudo = true;
        self
    }

    const fn place(mut self, alu: AluType, phase: Phase, enc_len: u8) -> Self {
        self.alu = Some(alu);
        self.phase = Some(phase);
        self.enc_len = enc_len;
        self
    }

    const fn srcs(mut self, src_mods: [RefModMask; 3]) -> Self {
        self.src_mods = src_mods;
        self
    }

    const fn mods(mut self, mods: ModMask) -> Self {
        self.mods = mods;
        self
    }

    const fn commutative(mut self) -> Self {
        self.commutative = true;
        self
    }

    pub fn is_variadic(&self) -> bool {
        self.num_srcs == !0
    }
}

const NEG_ABS: RefModMask = RefModMask::NEG.union(RefModMask::ABS);
const NEG_ABS_FLR: RefModMask = NEG_ABS.union(RefModMask::FLR);
const NO_MODS: RefModMask = RefModMask::NONE;

const ALU_MODS: ModMask = ModMask::RPT
    .union(ModMask::EXEC_CND)
    .union(ModMask::END)
    .union(ModMask::OLCHK);
const BITWISE_MODS: ModMask = ModMask::RPT.union(ModMask::EXEC_CND).union(ModMask::END);
const BACKEND_MODS: ModMask = ModMask::RPT.union(ModMask::EXEC_CND);

impl Op {
    pub const ALL: [Op; 29] = [
        Op::Vec,
        Op::Comp,
        Op::Neg,
        Op::Abs,
        Op::Flr,
        Op::Phi,
        Op::Mov,
        Op::Movi32,
        Op::Fadd,
        Op::Fmul,
        Op::Fmad,
        Op::Pck,
        Op::Tst,
        Op::UvswWrite,
        Op::UvswEndTask,
        Op::UvswWriteEndTask,
        Op::Ld,
        Op::St,
        Op::Fitr,
        Op::Atomic,
        Op::Cbs,
        Op::And,
        Op::Or,
        Op::Xor,
        Op::Shl,
        Op::Shr,
        Op::Nop,
        Op::Wdf,
        Op::Br,
    ];

    pub const fn info(self) -> OpInfo {
        use AluType::*;
        use Phase::*;
        match self {
            Op::Vec => op("vec", 1, !0).pseudo(),
            Op::Comp => op("comp", 1, 2).pseudo(),
            Op::Neg => op("neg", 1, 1).pseudo(),
            Op::Abs => op("abs", 1, 1).pseudo(),
            Op::Flr => op("flr", 1, 1).pseudo(),
            Op::Phi => op("phi", 1, 0).pseudo(),
            Op::Mov => op("mov", 1, 1).place(Main, P0, 1).srcs([NEG_ABS, NO_MODS, NO_MODS]).mods(ALU_MODS),
            Op::Movi32 => op("movi32", 1, 1).place(Main, P0, 5).mods(ModMask::EXEC_CND.union(ModMask::END)),
            Op::Fadd => op("fadd", 1, 2).place(Main, P0, 1).srcs([NEG_ABS_FLR, NEG_ABS, NO_MODS]).mods(ALU_MODS).commutative(),
            Op::Fmul => op("fmul", 1, 2).place(Main, P0, 1).srcs([NEG_ABS_FLR, NEG_ABS, NO_MODS]).mods(ALU_MODS).commutative(),
            Op::Fmad => op("fmad", 1, 3).place(Main, P0, 2).srcs([NEG_ABS, RefModMask::ABS, NEG_ABS_FLR]).mods(ALU_MODS),
            Op::Pck => op("pck", 1, 1).place(Main, P2Pck, 2).mods(BITWISE_MODS),
            Op::Tst => op("tst", 1, 2).place(Main, P2Tst, 2).mods(BACKEND_MODS),
            Op::UvswWrite => op("uvsw.write", 0, 2).place(Main, Backend, 2).mods(BACKEND_MODS),
            Op::UvswEndTask => op("uvsw.endtask", 0, 0).place(Main, Backend, 1),
            Op::UvswWriteEndTask => op("uvsw.writeendtask", 0, 2).place(Main, Backend, 2),
            Op::Ld => op("ld", 1, 2).place(Main, Backend, 3).mods(BACKEND_MODS),
            Op::St => op("st", 0, 3).place(Main, Backend, 3).mods(BACKEND_MODS),
            Op::Fitr => op("fitr", 1, 2).place(Main, Backend, 2).mods(BACKEND_MODS),
            Op::Atomic => op("atomic", 1, 3).place(Main, Backend, 3).mods(ModMask::EXEC_CND.union(ModMask::ATOM)),
            Op::Cbs => op("cbs", 1, 1).place(Bitwise, P0, 1).mods(BITWISE_MODS),
            Op::And => op("and", 1, 2).place(Bitwise, P1, 2).mods(BITWISE_MODS).commutative(),
            Op::Or => op("or", 1, 2).place(Bitwise, P1, 2).mods(BITWISE_MODS).commutative(),
            Op::Xor => op("xor", 1, 2).place(Bitwise, P1, 2).mods(BITWISE_MODS).commutative(),
            Op::Shl => op("shl", 1, 2).place(Bitwise, P2, 1).mods(BITWISE_MODS),
            Op::Shr => op("shr", 1, 2).place(Bitwise, P2, 1).mods(BITWISE_MODS),
            Op::Nop => op("nop", 0, 0).place(Control, Ctrl, 1).mods(ModMask::END.union(ModMask::EXEC_CND)),
            Op::Wdf => op("wdf", 0, 1).place(Control, Ctrl, 1),
            Op::Br => op("br", 0, 0).place(Control, Ctrl, 3).mods(ModMask::EXEC_CND),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Op::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Incoming value of a phi along one predecessor edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiSrc {
    pub pred: BlockId,
    pub value: Ref,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub dests: Vec<Ref>,
    pub srcs: Vec<Ref>,
    pub mods: InstrMods,
    pub target: Option<BlockId>,
    pub phi_srcs: Vec<PhiSrc>,
}

impl Instr {
    pub fn new(op: Op, dests: Vec<Ref>, srcs: Vec<Ref>) -> Self {
        Self {
            op,
            dests,
            srcs,
            mods: InstrMods::default(),
            target: None,
            phi_srcs: Vec::new(),
        }
    }

    pub fn with_mods(mut self, mods: InstrMods) -> Self {
        self.mods = mods;
        self
    }

    pub fn info(&self) -> OpInfo {
        self.op.info()
    }

    pub fn is_pseudo(&self) -> bool {
        self.info().pseudo
    }

    /// Whether every set modifier in `mask` can be carried by this op.
    pub fn supports_mods(&self, mask: ModMask) -> bool {
        self.info().mods.contains(mask)
    }

    /// Reference modifiers source slot `slot` can encode.
    pub fn src_mod_support(&self, slot: usize) -> RefModMask {
        self.info()
            .src_mods
            .get(slot)
            .copied()
            .unwrap_or(RefModMask::NONE)
    }

    /// Only atomics flagged `atom` are treated as having side effects; ops
    /// without destinations are never candidates for removal anyway.
    pub fn has_side_effects(&self) -> bool {
        self.op == Op::Atomic && self.mods.atom
    }

    pub fn ssa_dests(&self) -> impl Iterator<Item = u32> + '_ {
        self.dests.iter().filter_map(|d| d.as_ssa())
    }

    /// SSA values read by this instruction, phi sources included.
    pub fn ssa_srcs(&self) -> impl Iterator<Item = u32> + '_ {
        self.srcs
            .iter()
            .chain(self.phi_srcs.iter().map(|p| &p.value))
            .filter_map(|s| s.as_ssa())
    }

    /// Whether the main-ALU encoding needs its extension byte: floor, abs or
    /// range modifiers anywhere, or any modifier past the first source.
    pub fn needs_ext_encoding(&self) -> bool {
        self.srcs.iter().enumerate().any(|(slot, src)| {
            let m = &src.mods;
            m.flr || m.abs || m.oneminus || m.clamp || (slot > 0 && m.neg)
        })
    }
}
