//! Functions, blocks and control-flow structure.

use super::arena::{Arena, Id, List};
use super::builder::Cursor;
use super::igrp::Igrp;
use super::instr::Instr;
use super::refs::{Bits, Ref};

pub type InstrId = Id<Instr>;
pub type IgrpId = Id<Igrp>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Entrypoint,
    Callable,
}

/// Structured control flow. The straight-line passes only walk blocks in
/// order; if/loop nodes are preserved for the front end's benefit.
#[derive(Debug, Clone, PartialEq)]
pub enum CfNode {
    Block(BlockId),
    If {
        cond: Ref,
        then_body: Vec<CfNode>,
        else_body: Vec<CfNode>,
    },
    Loop {
        body: Vec<CfNode>,
    },
}

#[derive(Debug, Default)]
pub struct Block {
    pub name: String,
    pub(crate) instrs: List<Instr>,
    pub(crate) igrps: List<Igrp>,
}

impl Block {
    pub fn num_instrs(&self) -> usize {
        self.instrs.len()
    }

    pub fn num_igrps(&self) -> usize {
        self.igrps.len()
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub kind: FuncKind,
    /// One past the highest SSA index in use.
    pub next_ssa: u32,
    /// Temp registers consumed, set by register allocation.
    pub temps: u32,
    pub body: Vec<CfNode>,
    blocks: Vec<Block>,
    instrs: Arena<Instr>,
    igrps: Arena<Igrp>,
}

impl Function {
    pub fn new(name: impl Into<String>, kind: FuncKind) -> Self {
        Self {
            name: name.into(),
            kind,
            next_ssa: 0,
            temps: 0,
            body: Vec::new(),
            blocks: Vec::new(),
            instrs: Arena::new(),
            igrps: Arena::new(),
        }
    }

    pub fn is_entrypoint(&self) -> bool {
        self.kind == FuncKind::Entrypoint
    }

    /// Create a block and append it to the top-level body.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = self.new_block(name);
        self.body.push(CfNode::Block(id));
        id
    }

    /// Create a block without placing it in the body, for nesting inside
    /// if/loop nodes.
    pub fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            name: name.into(),
            ..Block::default()
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks in program order.
    pub fn block_order(&self) -> Vec<BlockId> {
        fn walk(nodes: &[CfNode], out: &mut Vec<BlockId>) {
            for node in nodes {
                match node {
                    CfNode::Block(id) => out.push(*id),
                    CfNode::If {
                        then_body,
                        else_body,
                        ..
                    } => {
                        walk(then_body, out);
                        walk(else_body, out);
                    }
                    CfNode::Loop { body } => walk(body, out),
                }
            }
        }

        let mut out = Vec::with_capacity(self.blocks.len());
        walk(&self.body, &mut out);
        out
    }

    pub fn has_control_flow(&self) -> bool {
        self.body.iter().any(|n| !matches!(n, CfNode::Block(_)))
    }

    pub fn new_ssa(&mut self, bits: Bits, chans: u8) -> Ref {
        let index = self.next_ssa;
        self.next_ssa += 1;
        Ref::ssa(index, bits, chans)
    }

    pub fn new_ssa32(&mut self) -> Ref {
        self.new_ssa(Bits::B32, 1)
    }

    // ---- instructions ----

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id]
    }

    pub fn contains_instr(&self, id: InstrId) -> bool {
        self.instrs.contains(id)
    }

    pub fn num_instrs(&self) -> usize {
        self.instrs.len()
    }

    pub fn block_instrs(&self, block: BlockId) -> impl Iterator<Item = InstrId> + '_ {
        self.instrs.iter(&self.blocks[block.index()].instrs)
    }

    /// Snapshot of every instruction handle in program order. Safe to hold
    /// while instructions are inserted or removed.
    pub fn instr_ids(&self) -> Vec<InstrId> {
        let mut ids = Vec::with_capacity(self.instrs.len());
        for block in self.block_order() {
            ids.extend(self.block_instrs(block));
        }
        ids
    }

    pub fn instr_block(&self, id: InstrId) -> Option<BlockId> {
        self.instrs.owner(id).map(BlockId)
    }

    pub fn next_instr(&self, id: InstrId) -> Option<InstrId> {
        self.instrs.next(id)
    }

    /// Last instruction of the last block, if that block has any.
    pub fn last_instr(&self) -> Option<InstrId> {
        let block = *self.block_order().last()?;
        self.blocks[block.index()].instrs.tail()
    }

    pub fn insert_instr(&mut self, cursor: Cursor, instr: Instr) -> InstrId {
        match cursor {
            Cursor::BeforeBlock(b) => {
                let list = &mut self.blocks[b.index()].instrs;
                self.instrs.push_front(list, b.0, instr)
            }
            Cursor::AfterBlock(b) => {
                let list = &mut self.blocks[b.index()].instrs;
                self.instrs.push_back(list, b.0, instr)
            }
            Cursor::BeforeInstr(anchor) => {
                let b = self.owner_of_instr(anchor);
                let list = &mut self.blocks[b].instrs;
                self.instrs.insert_before(list, anchor, instr)
            }
            Cursor::AfterInstr(anchor) => {
                let b = self.owner_of_instr(anchor);
                let list = &mut self.blocks[b].instrs;
                self.instrs.insert_after(list, anchor, instr)
            }
            Cursor::BeforeIgrp(_) | Cursor::AfterIgrp(_) => {
                panic!("instructions cannot be inserted at a group cursor")
            }
        }
    }

    pub fn remove_instr(&mut self, id: InstrId) -> Instr {
        let b = self.owner_of_instr(id);
        let list = &mut self.blocks[b].instrs;
        match self.instrs.remove(list, id) {
            Some(instr) => instr,
            None => panic!("stale instruction handle {:?}", id),
        }
    }

    /// Replace an instruction in place, keeping its position.
    pub fn replace_instr(&mut self, id: InstrId, instr: Instr) -> InstrId {
        let new = self.insert_instr(Cursor::AfterInstr(id), instr);
        self.remove_instr(id);
        new
    }

    fn owner_of_instr(&self, id: InstrId) -> usize {
        match self.instrs.owner(id) {
            Some(b) => b as usize,
            None => panic!("stale instruction handle {:?}", id),
        }
    }

    // ---- instruction groups ----

    pub fn igrp(&self, id: IgrpId) -> &Igrp {
        &self.igrps[id]
    }

    pub fn igrp_mut(&mut self, id: IgrpId) -> &mut Igrp {
        &mut self.igrps[id]
    }

    pub fn num_igrps(&self) -> usize {
        self.igrps.len()
    }

    pub fn block_igrps(&self, block: BlockId) -> impl Iterator<Item = IgrpId> + '_ {
        self.igrps.iter(&self.blocks[block.index()].igrps)
    }

    pub fn igrp_ids(&self) -> Vec<IgrpId> {
        let mut ids = Vec::with_capacity(self.igrps.len());
        for block in self.block_order() {
            ids.extend(self.block_igrps(block));
        }
        ids
    }

    pub fn insert_igrp(&mut self, cursor: Cursor, igrp: Igrp) -> IgrpId {
        match cursor {
            Cursor::BeforeBlock(b) => {
                let list = &mut self.blocks[b.index()].igrps;
                self.igrps.push_front(list, b.0, igrp)
            }
            Cursor::AfterBlock(b) => {
                let list = &mut self.blocks[b.index()].igrps;
                self.igrps.push_back(list, b.0, igrp)
            }
            Cursor::BeforeIgrp(anchor) => {
                let b = self.owner_of_igrp(anchor);
                let list = &mut self.blocks[b].igrps;
                self.igrps.insert_before(list, anchor, igrp)
            }
            Cursor::AfterIgrp(anchor) => {
                let b = self.owner_of_igrp(anchor);
                let list = &mut self.blocks[b].igrps;
                self.igrps.insert_after(list, anchor, igrp)
            }
            Cursor::BeforeInstr(_) | Cursor::AfterInstr(_) => {
                panic!("groups cannot be inserted at an instruction cursor")
            }
        }
    }

    fn owner_of_igrp(&self, id: IgrpId) -> usize {
        match self.igrps.owner(id) {
            Some(b) => b as usize,
            None => panic!("stale group handle {:?}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::Op;

    fn nop() -> Instr {
        Instr::new(Op::Nop, vec![], vec![])
    }

    #[test]
    fn test_block_order_flattens_control_flow() {
        let mut func = Function::new("f", FuncKind::Entrypoint);
        let entry = func.add_block("entry");
        let then_b = func.new_block("then");
        let else_b = func.new_block("else");
        let body_b = func.new_block("loop");
        func.body.push(CfNode::If {
            cond: Ref::pred(0),
            then_body: vec![CfNode::Block(then_b)],
            else_body: vec![CfNode::Block(else_b)],
        });
        func.body.push(CfNode::Loop {
            body: vec![CfNode::Block(body_b)],
        });
        let exit = func.add_block("exit");

        assert_eq!(func.block_order(), vec![entry, then_b, else_b, body_b, exit]);
        assert!(func.has_control_flow());
    }

    #[test]
    fn test_cursor_insertion_across_blocks() {
        let mut func = Function::new("f", FuncKind::Entrypoint);
        let b0 = func.add_block("b0");
        let b1 = func.add_block("b1");
        let a = func.insert_instr(Cursor::AfterBlock(b1), nop());
        let b = func.insert_instr(Cursor::BeforeBlock(b0), nop());
        let c = func.insert_instr(Cursor::BeforeInstr(a), nop());
        let d = func.insert_instr(Cursor::AfterInstr(b), nop());

        assert_eq!(func.instr_ids(), vec![b, d, c, a]);
        assert_eq!(func.instr_block(c), Some(b1));
        assert_eq!(func.last_instr(), Some(a));

        func.remove_instr(a);
        assert_eq!(func.last_instr(), Some(c));
        assert_eq!(func.num_instrs(), 3);
    }

    #[test]
    fn test_last_instr_ignores_earlier_blocks() {
        let mut func = Function::new("f", FuncKind::Entrypoint);
        let b0 = func.add_block("b0");
        func.add_block("b1");
        func.insert_instr(Cursor::AfterBlock(b0), nop());
        assert_eq!(func.last_instr(), None);
    }
}
