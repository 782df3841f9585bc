//! Operand references.
//!
//! A [`Ref`] names where an operand lives (SSA value, hardware register,
//! immediate, I/O slot, predicate or DRC) together with its storage footprint
//! (bit width times channel count) and the per-use modifiers applied when it
//! is read. Modifiers compose as `neg(abs(flr(x)))`.

/// Bit width of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bits {
    B1,
    B8,
    B16,
    B32,
    B64,
}

impl Bits {
    pub fn bits(self) -> u32 {
        match self {
            Bits::B1 => 1,
            Bits::B8 => 8,
            Bits::B16 => 16,
            Bits::B32 => 32,
            Bits::B64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Bits::B1),
            8 => Some(Bits::B8),
            16 => Some(Bits::B16),
            32 => Some(Bits::B32),
            64 => Some(Bits::B64),
            _ => None,
        }
    }
}

/// Hardware register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Temp,
    VtxIn,
    Coeff,
    Shared,
    Index,
    Spec,
    Intern,
    Const,
    Pixout,
    Global,
    Slot,
}

impl RegClass {
    pub const ALL: [RegClass; 11] = [
        RegClass::Temp,
        RegClass::VtxIn,
        RegClass::Coeff,
        RegClass::Shared,
        RegClass::Index,
        RegClass::Spec,
        RegClass::Intern,
        RegClass::Const,
        RegClass::Pixout,
        RegClass::Global,
        RegClass::Slot,
    ];

    /// Textual prefix used by the IR printer and parser.
    pub fn prefix(self) -> &'static str {
        match self {
            RegClass::Temp => "r",
            RegClass::VtxIn => "vi",
            RegClass::Coeff => "cf",
            RegClass::Shared => "sh",
            RegClass::Index => "idx",
            RegClass::Spec => "sr",
            RegClass::Intern => "is",
            RegClass::Const => "sc",
            RegClass::Pixout => "po",
            RegClass::Global => "g",
            RegClass::Slot => "sl",
        }
    }

    /// Banks reachable through the one-byte source/destination encodings.
    pub fn has_short_encoding(self) -> bool {
        matches!(self, RegClass::Temp | RegClass::Coeff | RegClass::Const)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Null,
    Ssa(u32),
    Reg(RegClass, u32),
    Imm(u32),
    Io(u32),
    Pred(u32),
    Drc(u32),
}

/// Set of reference modifiers, used to describe what a source slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefModMask(u8);

impl RefModMask {
    pub const NONE: Self = Self(0);
    pub const NEG: Self = Self(1 << 0);
    pub const ABS: Self = Self(1 << 1);
    pub const FLR: Self = Self(1 << 2);
    pub const ONEMINUS: Self = Self(1 << 3);
    pub const CLAMP: Self = Self(1 << 4);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for RefModMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Per-use modifiers on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RefMods {
    pub neg: bool,
    pub abs: bool,
    pub flr: bool,
    pub oneminus: bool,
    pub clamp: bool,
}

impl RefMods {
    pub const NONE: Self = Self {
        neg: false,
        abs: false,
        flr: false,
        oneminus: false,
        clamp: false,
    };

    pub fn mask(&self) -> RefModMask {
        let mut mask = RefModMask::NONE;
        if self.neg {
            mask = mask | RefModMask::NEG;
        }
        if self.abs {
            mask = mask | RefModMask::ABS;
        }
        if self.flr {
            mask = mask | RefModMask::FLR;
        }
        if self.oneminus {
            mask = mask | RefModMask::ONEMINUS;
        }
        if self.clamp {
            mask = mask | RefModMask::CLAMP;
        }
        mask
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Modifiers equivalent to applying `outer` to a value already read
    /// through `inner`, if a single reference can express that.
    ///
    /// Floor is applied first by the hardware, so it cannot be stacked on top
    /// of a negated or absolute value.
    pub fn compose(inner: RefMods, outer: RefMods) -> Option<RefMods> {
        if inner.oneminus || inner.clamp || outer.oneminus || outer.clamp {
            return None;
        }

        let mut mods = inner;
        if outer.flr {
            if inner.neg || inner.abs {
                return None;
            }
            mods.flr = true;
        }
        if outer.abs {
            mods.abs = true;
            mods.neg = false;
        }
        mods.neg ^= outer.neg;
        Some(mods)
    }
}

/// Operand reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    pub kind: RefKind,
    pub bits: Bits,
    pub chans: u8,
    /// Sub-element selector for sub-32-bit reads.
    pub elem: u8,
    pub mods: RefMods,
}

impl Default for Ref {
    fn default() -> Self {
        Self::NULL
    }
}

impl Ref {
    pub const NULL: Ref = Ref {
        kind: RefKind::Null,
        bits: Bits::B32,
        chans: 1,
        elem: 0,
        mods: RefMods::NONE,
    };

    fn with_kind(kind: RefKind, bits: Bits, chans: u8) -> Self {
        Self {
            kind,
            bits,
            chans,
            elem: 0,
            mods: RefMods::NONE,
        }
    }

    pub fn ssa(index: u32, bits: Bits, chans: u8) -> Self {
        Self::with_kind(RefKind::Ssa(index), bits, chans)
    }

    pub fn ssa32(index: u32) -> Self {
        Self::ssa(index, Bits::B32, 1)
    }

    pub fn hwreg(class: RegClass, index: u32) -> Self {
        Self::with_kind(RefKind::Reg(class, index), Bits::B32, 1)
    }

    pub fn hwreg_vec(class: RegClass, index: u32, chans: u8) -> Self {
        Self::with_kind(RefKind::Reg(class, index), Bits::B32, chans)
    }

    pub fn imm32(value: u32) -> Self {
        Self::with_kind(RefKind::Imm(value), Bits::B32, 1)
    }

    pub fn io(slot: u32) -> Self {
        Self::with_kind(RefKind::Io(slot), Bits::B32, 1)
    }

    pub fn pred(index: u32) -> Self {
        Self::with_kind(RefKind::Pred(index), Bits::B1, 1)
    }

    pub fn drc(index: u32) -> Self {
        Self::with_kind(RefKind::Drc(index), Bits::B32, 1)
    }

    pub fn is_null(&self) -> bool {
        self.kind == RefKind::Null
    }

    pub fn is_ssa(&self) -> bool {
        matches!(self.kind, RefKind::Ssa(_))
    }

    pub fn as_ssa(&self) -> Option<u32> {
        match self.kind {
            RefKind::Ssa(index) => Some(index),
            _ => None,
        }
    }

    pub fn is_reg(&self) -> bool {
        matches!(self.kind, RefKind::Reg(..))
    }

    pub fn as_reg(&self) -> Option<(RegClass, u32)> {
        match self.kind {
            RefKind::Reg(class, index) => Some((class, index)),
            _ => None,
        }
    }

    pub fn as_imm(&self) -> Option<u32> {
        match self.kind {
            RefKind::Imm(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_drc(&self) -> bool {
        matches!(self.kind, RefKind::Drc(_))
    }

    pub fn has_mods(&self) -> bool {
        !self.mods.is_none()
    }

    pub fn with_mods(mut self, mods: RefMods) -> Self {
        self.mods = mods;
        self
    }

    pub fn without_mods(self) -> Self {
        self.with_mods(RefMods::NONE)
    }

    /// Toggle negation.
    pub fn neg(mut self) -> Self {
        self.mods.neg = !self.mods.neg;
        self
    }

    pub fn abs(mut self) -> Self {
        self.mods.abs = true;
        self
    }

    pub fn flr(mut self) -> Self {
        self.mods.flr = true;
        self
    }

    /// Same width and channel count, the condition for substituting one
    /// value for another.
    pub fn same_shape(&self, other: &Ref) -> bool {
        self.bits == other.bits && self.chans == other.chans
    }

    /// Narrowed view of `chans` channels starting `offset` channels into a
    /// hardware register vector.
    pub fn reg_view(&self, offset: u32, chans: u8) -> Option<Ref> {
        let (class, index) = self.as_reg()?;
        if offset + chans as u32 > self.chans as u32 {
            return None;
        }
        Some(Ref {
            kind: RefKind::Reg(class, index + offset),
            chans,
            ..*self
        })
    }

    /// Whether two hardware register references touch a common register.
    pub fn overlaps(&self, other: &Ref) -> bool {
        match (self.as_reg(), other.as_reg()) {
            (Some((a_class, a)), Some((b_class, b))) => {
                a_class == b_class
                    && a < b + other.chans as u32
                    && b < a + self.chans as u32
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(neg: bool, abs: bool, flr: bool) -> RefMods {
        RefMods {
            neg,
            abs,
            flr,
            ..RefMods::NONE
        }
    }

    #[test]
    fn test_compose_neg_is_xor() {
        let composed = RefMods::compose(mods(true, false, false), mods(true, false, false));
        assert_eq!(composed, Some(RefMods::NONE));
    }

    #[test]
    fn test_compose_abs_clears_inner_neg() {
        let composed = RefMods::compose(mods(true, false, true), mods(false, true, false));
        assert_eq!(composed, Some(mods(false, true, true)));
    }

    #[test]
    fn test_compose_floor_over_neg_is_unrepresentable() {
        assert_eq!(RefMods::compose(mods(true, false, false), mods(false, false, true)), None);
        assert_eq!(
            RefMods::compose(mods(false, false, true), mods(false, false, true)),
            Some(mods(false, false, true))
        );
    }

    #[test]
    fn test_mask_contains() {
        let slot = RefModMask::NEG | RefModMask::ABS;
        assert!(slot.contains(mods(true, true, false).mask()));
        assert!(!slot.contains(mods(false, false, true).mask()));
        assert!(slot.contains(RefMods::NONE.mask()));
    }

    #[test]
    fn test_reg_view_and_overlap() {
        let vec4 = Ref::hwreg_vec(RegClass::Temp, 4, 4);
        let view = vec4.reg_view(2, 1).unwrap();
        assert_eq!(view.as_reg(), Some((RegClass::Temp, 6)));
        assert_eq!(view.chans, 1);
        assert!(vec4.reg_view(3, 2).is_none());

        assert!(vec4.overlaps(&Ref::hwreg(RegClass::Temp, 7)));
        assert!(!vec4.overlaps(&Ref::hwreg(RegClass::Temp, 8)));
        assert!(!vec4.overlaps(&Ref::hwreg(RegClass::Const, 5)));
    }
}
