//! Cursor-based instruction builder.

use super::func::{BlockId, Function, IgrpId, InstrId};
use super::igrp::Igrp;
use super::instr::{Instr, Op};
use super::refs::{Bits, Ref};

/// Insertion point within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    BeforeBlock(BlockId),
    AfterBlock(BlockId),
    BeforeInstr(InstrId),
    AfterInstr(InstrId),
    BeforeIgrp(IgrpId),
    AfterIgrp(IgrpId),
}

/// Inserts nodes at a cursor, advancing past each inserted node so that
/// consecutive inserts come out in call order.
pub struct Builder<'f> {
    func: &'f mut Function,
    cursor: Cursor,
}

impl<'f> Builder<'f> {
    pub fn new(func: &'f mut Function, cursor: Cursor) -> Self {
        Self { func, cursor }
    }

    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        Self::new(func, Cursor::AfterBlock(block))
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn func(&mut self) -> &mut Function {
        self.func
    }

    pub fn insert(&mut self, instr: Instr) -> InstrId {
        let id = self.func.insert_instr(self.cursor, instr);
        self.cursor = Cursor::AfterInstr(id);
        id
    }

    pub fn insert_igrp(&mut self, igrp: Igrp) -> IgrpId {
        let id = self.func.insert_igrp(self.cursor, igrp);
        self.cursor = Cursor::AfterIgrp(id);
        id
    }

    pub fn new_ssa(&mut self, bits: Bits, chans: u8) -> Ref {
        self.func.new_ssa(bits, chans)
    }

    pub fn new_ssa32(&mut self) -> Ref {
        self.func.new_ssa32()
    }

    pub fn mov(&mut self, dest: Ref, src: Ref) -> InstrId {
        self.insert(Instr::new(Op::Mov, vec![dest], vec![src]))
    }

    pub fn movi32(&mut self, dest: Ref, value: u32) -> InstrId {
        self.insert(Instr::new(Op::Movi32, vec![dest], vec![Ref::imm32(value)]))
    }

    pub fn fadd(&mut self, dest: Ref, a: Ref, b: Ref) -> InstrId {
        self.insert(Instr::new(Op::Fadd, vec![dest], vec![a, b]))
    }

    pub fn fmul(&mut self, dest: Ref, a: Ref, b: Ref) -> InstrId {
        self.insert(Instr::new(Op::Fmul, vec![dest], vec![a, b]))
    }

    pub fn neg(&mut self, dest: Ref, src: Ref) -> InstrId {
        self.insert(Instr::new(Op::Neg, vec![dest], vec![src]))
    }

    pub fn abs(&mut self, dest: Ref, src: Ref) -> InstrId {
        self.insert(Instr::new(Op::Abs, vec![dest], vec![src]))
    }

    pub fn flr(&mut self, dest: Ref, src: Ref) -> InstrId {
        self.insert(Instr::new(Op::Flr, vec![dest], vec![src]))
    }

    pub fn vec(&mut self, dest: Ref, srcs: Vec<Ref>) -> InstrId {
        self.insert(Instr::new(Op::Vec, vec![dest], srcs))
    }

    pub fn comp(&mut self, dest: Ref, src: Ref, offset: u32) -> InstrId {
        self.insert(Instr::new(Op::Comp, vec![dest], vec![src, Ref::imm32(offset)]))
    }

    pub fn uvsw_write(&mut self, src: Ref, slot: u32) -> InstrId {
        self.insert(Instr::new(Op::UvswWrite, vec![], vec![src, Ref::io(slot)]))
    }

    pub fn uvsw_endtask(&mut self) -> InstrId {
        self.insert(Instr::new(Op::UvswEndTask, vec![], vec![]))
    }

    pub fn nop(&mut self) -> InstrId {
        self.insert(Instr::new(Op::Nop, vec![], vec![]))
    }

    pub fn wdf(&mut self, drc: Ref) -> InstrId {
        self.insert(Instr::new(Op::Wdf, vec![], vec![drc]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::func::FuncKind;

    #[test]
    fn test_builder_advances_cursor() {
        let mut func = Function::new("f", FuncKind::Entrypoint);
        let block = func.add_block("entry");
        let tail = func.insert_instr(Cursor::AfterBlock(block), Instr::new(Op::Nop, vec![], vec![]));

        let mut b = Builder::new(&mut func, Cursor::BeforeInstr(tail));
        let dest = b.new_ssa32();
        let first = b.movi32(dest, 7);
        let second = b.mov(Ref::hwreg(crate::ir::RegClass::Temp, 0), dest);
        assert_eq!(b.cursor(), Cursor::AfterInstr(second));

        assert_eq!(func.instr_ids(), vec![first, second, tail]);
        assert_eq!(func.next_ssa, 1);
    }
}
