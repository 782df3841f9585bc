// This module defines PCO IR, the representation every backend pass reads and rewrites.
// A Shader owns its Functions; a Function owns an arena of instructions, an arena of
// instruction groups and the Blocks that thread them into ordered lists, plus structured
// control flow (If/Loop nodes around blocks). Instructions reference operands through Ref
// values: SSA indices before register allocation and hardware registers after it. Handles
// into the arenas are generation checked, so a pass that deletes an instruction cannot be
// tricked into mutating an unrelated one that later reuses the slot. The Builder inserts at
// a Cursor and advances past what it inserted, which is how every pass emits new code.

//! PCO intermediate representation.

pub mod arena;
pub mod builder;
pub mod display;
pub mod func;
pub mod igrp;
pub mod instr;
pub mod refs;

pub use arena::{Arena, Id, List};
pub use builder::{Builder, Cursor};
pub use func::{Block, BlockId, CfNode, FuncKind, Function, IgrpId, InstrId};
pub use igrp::{
    DestVariant, HdrVariant, Igrp, IgrpEnc, IgrpHeader, IgrpVariant, SrcSize, SrcSlot, SrcVariant,
};
pub use instr::{AluType, ExecCnd, Instr, InstrMods, ModMask, Op, OpInfo, Phase, PhiSrc};
pub use refs::{Bits, Ref, RefKind, RefModMask, RefMods, RegClass};

/// Shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "vertex" => Some(Stage::Vertex),
            "fragment" => Some(Stage::Fragment),
            "compute" => Some(Stage::Compute),
            _ => None,
        }
    }
}

/// Per-shader results consumed by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderData {
    /// Peak temp registers over all functions.
    pub temps: u32,
}

#[derive(Debug)]
pub struct Shader {
    pub name: String,
    pub stage: Stage,
    pub functions: Vec<Function>,
    /// Set once instructions have been packed into instruction groups.
    pub is_grouped: bool,
    pub data: ShaderData,
}

impl Shader {
    pub fn new(name: impl Into<String>, stage: Stage) -> Self {
        Self {
            name: name.into(),
            stage,
            functions: Vec::new(),
            is_grouped: false,
            data: ShaderData::default(),
        }
    }

    pub fn add_function(&mut self, func: Function) -> usize {
        self.functions.push(func);
        self.functions.len() - 1
    }

    pub fn entrypoint(&self) -> Option<&Function> {
        self.functions.iter().find(|f| f.is_entrypoint())
    }

    pub fn entrypoint_mut(&mut self) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.is_entrypoint())
    }

    pub fn num_instrs(&self) -> usize {
        self.functions.iter().map(|f| f.num_instrs()).sum()
    }

    pub fn num_igrps(&self) -> usize {
        self.functions.iter().map(|f| f.num_igrps()).sum()
    }

    /// Encoded size of the grouped stream, summed over functions.
    pub fn code_size(&self) -> u32 {
        self.functions
            .iter()
            .filter_map(|f| f.igrp_ids().last().map(|&id| f.igrp(id).end_offset()))
            .sum()
    }
}
