// Constant-register folding. The hardware exposes a bank of read-only special constant
// registers holding small integers, powers of two and common transcendental values. A
// movi32 whose immediate matches one of them, directly or as the negated, floored or
// negated-floor view of a float entry, is rewritten into a read of that register so the
// five-byte immediate encoding disappears. The lookup table is built once, sorted by bit
// pattern and searched by exact match; plain entries take priority over derived ones.

//! Folding of immediates into constant-register reads.

use hashbrown::HashMap;
use std::sync::OnceLock;

use crate::core::CompilationSession;
use crate::ir::{Builder, Cursor, Instr, Op, Ref, RefMods, RegClass, Shader};

/// Values of the constant-register bank, indexed by register number.
const CONST_REGS: [u32; 64] = [
    // 0..31: the integers 0 to 31.
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
    25, 26, 27, 28, 29, 30, 31,
    // 32..39: 1.0 to 128.0.
    0x3f80_0000, 0x4000_0000, 0x4080_0000, 0x4100_0000, 0x4180_0000, 0x4200_0000, 0x4280_0000,
    0x4300_0000,
    // 40..46: 0.5 to 1/128.
    0x3f00_0000, 0x3e80_0000, 0x3e00_0000, 0x3d80_0000, 0x3d00_0000, 0x3c80_0000, 0x3c00_0000,
    // 47..56: pi, 1/pi, 2pi, pi/2, ln 2, e, sqrt 2, 1/sqrt 2, log2 e, 1/3.
    0x4049_0fdb, 0x3ea2_f983, 0x40c9_0fdb, 0x3fc9_0fdb, 0x3f31_7218, 0x402d_f854, 0x3fb5_04f3,
    0x3f35_04f3, 0x3fb8_aa3b, 0x3eaa_aaab,
    // 57..63: largest float below one, +inf, all-ones patterns, sign bit, 0.75, 3.0.
    0x3f7f_ffff, 0x7f80_0000, 0x7fff_ffff, 0x8000_0000, 0xffff_ffff, 0x3f40_0000, 0x4040_0000,
];

/// First register holding a float rather than an integer.
const FIRST_FLOAT_REG: usize = 32;

/// A bit pattern reachable through a constant register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstEntry {
    pub bits: u32,
    pub reg: u32,
    pub flr: bool,
    pub neg: bool,
}

impl ConstEntry {
    /// The source reference reading this entry.
    pub fn to_ref(&self) -> Ref {
        Ref::hwreg(RegClass::Const, self.reg).with_mods(RefMods {
            neg: self.neg,
            flr: self.flr,
            ..RefMods::NONE
        })
    }
}

fn build_table() -> Vec<ConstEntry> {
    let mut entries: HashMap<u32, ConstEntry> = HashMap::new();
    let floats: Vec<(u32, f32)> = CONST_REGS
        .iter()
        .enumerate()
        .skip(FIRST_FLOAT_REG)
        .map(|(reg, &bits)| (reg as u32, f32::from_bits(bits)))
        .filter(|(_, value)| value.is_finite())
        .collect();

    for (reg, &bits) in CONST_REGS.iter().enumerate() {
        entries.entry(bits).or_insert(ConstEntry {
            bits,
            reg: reg as u32,
            flr: false,
            neg: false,
        });
    }

    // Derived views, in priority order: neg, flr, then both.
    for (flr, neg) in [(false, true), (true, false), (true, true)] {
        for &(reg, value) in &floats {
            let floored = if flr { value.floor() } else { value };
            if flr && floored.to_bits() == value.to_bits() {
                continue;
            }
            let bits = if neg { (-floored).to_bits() } else { floored.to_bits() };
            entries.entry(bits).or_insert(ConstEntry { bits, reg, flr, neg });
        }
    }

    let mut table: Vec<ConstEntry> = entries.into_values().collect();
    table.sort_unstable_by_key(|e| e.bits);
    table
}

/// The sorted constant table.
pub fn table() -> &'static [ConstEntry] {
    static TABLE: OnceLock<Vec<ConstEntry>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Find the constant register (and modifiers) producing `bits`.
pub fn lookup(bits: u32) -> Option<ConstEntry> {
    let table = table();
    table
        .binary_search_by_key(&bits, |e| e.bits)
        .ok()
        .map(|i| table[i])
}

/// Bit pattern read from constant register `reg` through `mods`.
pub fn const_reg_value(reg: u32, mods: RefMods) -> Option<u32> {
    let bits = *CONST_REGS.get(reg as usize)?;
    if mods.is_none() {
        return Some(bits);
    }
    if mods.oneminus || mods.clamp {
        return None;
    }
    let mut value = f32::from_bits(bits);
    if mods.flr {
        value = value.floor();
    }
    if mods.abs {
        value = value.abs();
    }
    if mods.neg {
        value = -value;
    }
    Some(value.to_bits())
}

fn folded(entry: ConstEntry, dest: Ref) -> Instr {
    let src = Ref::hwreg(RegClass::Const, entry.reg);
    match (entry.flr, entry.neg) {
        (false, false) => Instr::new(Op::Mov, vec![dest], vec![src]),
        (false, true) => Instr::new(Op::Neg, vec![dest], vec![src]),
        (true, false) => Instr::new(Op::Flr, vec![dest], vec![src]),
        // No single mov can carry both modifiers; add zero instead.
        (true, true) => Instr::new(
            Op::Fadd,
            vec![dest],
            vec![entry.to_ref(), Ref::hwreg(RegClass::Const, 0)],
        ),
    }
}

/// Rewrite every foldable `movi32` in the shader. Returns whether anything
/// was folded.
pub fn run(shader: &mut Shader, session: &CompilationSession) -> bool {
    let mut count = 0;

    for func in &mut shader.functions {
        for id in func.instr_ids() {
            let instr = func.instr(id);
            if instr.op != Op::Movi32 {
                continue;
            }
            // Instruction modifiers would be lost on the pseudo-op forms.
            if !instr.mods.is_default() {
                continue;
            }
            let Some(bits) = instr.srcs.first().and_then(|s| s.as_imm()) else {
                continue;
            };
            let Some(entry) = lookup(bits) else {
                continue;
            };

            let dest = instr.dests[0];
            let replacement = folded(entry, dest);
            log::trace!("const_fold: {} -> {}", func.instr(id), replacement);

            Builder::new(func, Cursor::BeforeInstr(id)).insert(replacement);
            func.remove_instr(id);
            count += 1;
        }
    }

    if count > 0 {
        log::debug!("const_fold: folded {} immediates", count);
    }
    session.record_constants_folded(count);
    count > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{lines, shader, TestContext};

    #[test]
    fn test_table_is_sorted_and_unique() {
        let table = table();
        assert!(table.windows(2).all(|w| w[0].bits < w[1].bits));
        // Every plain register value is reachable without modifiers.
        for (reg, &bits) in CONST_REGS.iter().enumerate() {
            let entry = lookup(bits).unwrap();
            assert!(!entry.flr && !entry.neg, "{:#x}", bits);
            assert_eq!(entry.reg, reg as u32);
        }
    }

    #[test]
    fn test_every_entry_round_trips() {
        for entry in table() {
            let r = entry.to_ref();
            let (_, reg) = r.as_reg().unwrap();
            assert_eq!(const_reg_value(reg, r.mods), Some(entry.bits), "{:?}", entry);
        }
    }

    #[test]
    fn test_derived_entries() {
        // -1.0
        let entry = lookup(0xbf80_0000).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (32, false, true));
        // floor(pi) = 3.0 is a plain register of its own.
        let entry = lookup(0x4040_0000).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (63, false, false));
        // floor(2pi) = 6.0 only exists as a floored view.
        let entry = lookup(6.0f32.to_bits()).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (49, true, false));
        // -floor(e) = -2.0 is reachable as neg(2.0) first.
        let entry = lookup((-2.0f32).to_bits()).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (33, false, true));
        // -floor(2pi) = -6.0 needs both modifiers.
        let entry = lookup((-6.0f32).to_bits()).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (49, true, true));
        assert!(lookup(0x1234_5678).is_none());
    }

    #[test]
    fn test_negated_floor_applies_floor_first() {
        let two_pi = f32::from_bits(CONST_REGS[49]);
        let entry = lookup((-two_pi.floor()).to_bits()).unwrap();
        assert_eq!((entry.reg, entry.flr, entry.neg), (49, true, true));
        let r = entry.to_ref();
        let (_, reg) = r.as_reg().unwrap();
        assert_eq!(const_reg_value(reg, r.mods), Some((-6.0f32).to_bits()));
        // floor(-2pi) = -7.0 is a different value and not in the table.
        assert!(lookup((-two_pi).floor().to_bits()).is_none());
    }

    #[test]
    fn test_fold_rewrites_each_shape() {
        let mut s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = movi32 0x3f800000
                 %1 = movi32 0xbf800000
                 %2 = movi32 0x40c00000
                 %3 = movi32 0xc0c00000
                 %4 = movi32 0x12345678
             }",
        );
        let ctx = TestContext::new();
        let progress = ctx.with_session(|session| run(&mut s, session));
        assert!(progress);
        assert_eq!(
            lines(&s),
            vec![
                "%0 = mov sc32",
                "%1 = neg sc32",
                "%2 = flr sc49",
                "%3 = fadd sc49.flr.neg, sc0",
                "%4 = movi32 0x12345678",
            ]
        );
    }

    #[test]
    fn test_miss_leaves_shader_unchanged() {
        let src = "shader fragment
             entry main {
             b0:
                 %0 = movi32 0x12345678
                 %1 = movi32.end 0x3f800000
             }";
        let mut s = shader(src);
        let before = lines(&s);
        let ctx = TestContext::new();
        assert!(!ctx.with_session(|session| run(&mut s, session)));
        assert_eq!(lines(&s), before);
    }
}
