//! Textual rendering of PCO IR, in the syntax accepted by [`crate::text`].

use std::fmt;

use super::func::Function;
use super::igrp::Igrp;
use super::instr::Instr;
use super::refs::{Bits, Ref, RefKind};
use super::Shader;

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RefKind::Null => write!(f, "_")?,
            RefKind::Ssa(index) => write!(f, "%{}", index)?,
            RefKind::Reg(class, index) => write!(f, "{}{}", class.prefix(), index)?,
            RefKind::Imm(value) => write!(f, "0x{:x}", value)?,
            RefKind::Io(slot) => write!(f, "io{}", slot)?,
            RefKind::Pred(index) => write!(f, "p{}", index)?,
            RefKind::Drc(index) => write!(f, "drc{}", index)?,
        }
        if self.chans != 1 {
            write!(f, ":{}", self.chans)?;
        }
        let default_bits = match self.kind {
            RefKind::Pred(_) => Bits::B1,
            _ => Bits::B32,
        };
        if self.bits != default_bits {
            write!(f, "@{}", self.bits.bits())?;
        }
        if self.elem != 0 {
            write!(f, ".e{}", self.elem)?;
        }
        let m = &self.mods;
        for (set, name) in [
            (m.flr, "flr"),
            (m.abs, "abs"),
            (m.neg, "neg"),
            (m.oneminus, "oneminus"),
            (m.clamp, "clamp"),
        ] {
            if set {
                write!(f, ".{}", name)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dest) in self.dests.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dest)?;
        }
        if !self.dests.is_empty() {
            write!(f, " = ")?;
        }

        write!(f, "{}", self.op.name())?;
        let m = &self.mods;
        if m.rpt != 1 {
            write!(f, ".rpt{}", m.rpt)?;
        }
        if m.exec_cnd != Default::default() {
            write!(f, ".{}", m.exec_cnd.name())?;
        }
        if m.olchk {
            write!(f, ".olchk")?;
        }
        if m.atom {
            write!(f, ".atom")?;
        }
        if m.end {
            write!(f, ".end")?;
        }

        for (i, src) in self.srcs.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { " " } else { ", " }, src)?;
        }
        for (i, phi) in self.phi_srcs.iter().enumerate() {
            let sep = if i == 0 && self.srcs.is_empty() { " " } else { ", " };
            write!(f, "{}{} <- b{}", sep, phi.value, phi.pred.0)?;
        }
        if let Some(target) = self.target {
            write!(f, " -> b{}", target.0)?;
        }
        Ok(())
    }
}

impl fmt::Display for Igrp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:4}: [{} len={} da={} total={}]",
            self.offset,
            self.hdr.alu.name(),
            self.hdr.length,
            self.hdr.da,
            self.enc.total
        )?;
        for (phase, instr) in self.phases() {
            write!(f, " {}: {}", phase.name(), instr)?;
        }
        if self.hdr.end {
            write!(f, " (end)")?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_entrypoint() { "entry" } else { "func" };
        writeln!(f, "{} {} {{", keyword, self.name)?;
        for block in self.block_order() {
            writeln!(f, "{}:", self.block(block).name)?;
            for id in self.block_instrs(block) {
                writeln!(f, "    {}", self.instr(id))?;
            }
            for id in self.block_igrps(block) {
                writeln!(f, "    {}", self.igrp(id))?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shader {}", self.stage.name())?;
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Op, RegClass};

    #[test]
    fn test_ref_display() {
        assert_eq!(Ref::ssa32(3).to_string(), "%3");
        assert_eq!(Ref::ssa(4, Bits::B64, 2).to_string(), "%4:2@64");
        assert_eq!(Ref::hwreg(RegClass::Const, 32).neg().flr().to_string(), "sc32.flr.neg");
        assert_eq!(Ref::imm32(0x3f80_0000).to_string(), "0x3f800000");
        assert_eq!(Ref::pred(1).to_string(), "p1");
    }

    #[test]
    fn test_instr_display() {
        let mut instr = Instr::new(
            Op::Fadd,
            vec![Ref::ssa32(2)],
            vec![Ref::ssa32(0).abs(), Ref::hwreg(RegClass::Temp, 1)],
        );
        instr.mods.rpt = 2;
        instr.mods.end = true;
        assert_eq!(instr.to_string(), "%2 = fadd.rpt2.end %0.abs, r1");

        let nop = Instr::new(Op::Nop, vec![], vec![]);
        assert_eq!(nop.to_string(), "nop");
    }
}
