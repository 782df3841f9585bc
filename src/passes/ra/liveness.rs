//! Live ranges of SSA representatives over a straight-line function.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::HashMap;

use super::overrides::StorageOverrides;
use crate::ir::{Function, Op};

/// Half-open instruction-index interval `[start, end)` during which a
/// representative's storage is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub value: u32,
    pub start: u32,
    pub end: u32,
}

impl LiveRange {
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One forward scan over the function, resolving every SSA operand through
/// `overrides`. The result is sorted by representative.
///
/// A value read by an instruction normally frees its storage for that
/// instruction's destination. Vector builds and instructions writing more
/// than one channel keep their sources live across the write, as the write
/// is not atomic with the reads.
pub fn compute_live_ranges<'arena>(
    func: &Function,
    overrides: &mut StorageOverrides,
    arena: &'arena Bump,
) -> BumpVec<'arena, LiveRange> {
    let mut spans: HashMap<u32, (u32, u32)> = HashMap::new();
    let mut touch = |value: u32, start: u32, end: u32| {
        let span = spans.entry(value).or_insert((start, end));
        span.0 = span.0.min(start);
        span.1 = span.1.max(end);
    };

    for (index, id) in func.instr_ids().into_iter().enumerate() {
        let index = index as u32;
        let instr = func.instr(id);
        let wide_write = instr.op == Op::Vec
            || instr.mods.rpt > 1
            || instr.dests.iter().any(|d| d.chans > 1);
        let read_end = if wide_write { index + 1 } else { index };

        for ssa in instr.ssa_srcs() {
            let (rep, _) = overrides.resolve(ssa);
            touch(rep, index, read_end);
        }
        for ssa in instr.ssa_dests() {
            let (rep, _) = overrides.resolve(ssa);
            touch(rep, index, index + 1);
        }
    }

    let mut ranges = BumpVec::with_capacity_in(spans.len(), arena);
    ranges.extend(spans.into_iter().map(|(value, (start, end))| LiveRange {
        value,
        start,
        end: end.max(start + 1),
    }));
    ranges.sort_unstable_by_key(|r| r.value);
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::shader;

    #[test]
    fn test_ranges_are_half_open() {
        let s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = fadd r0, r1
                 %1 = fadd %0, r1
                 %2 = fmul %0, %1
                 %3 = fadd r0, r1
                 uvsw.write %2, io0
             }",
        );
        let func = s.entrypoint().unwrap();
        let mut overrides = StorageOverrides::new(func.next_ssa);
        let arena = Bump::new();
        let ranges = compute_live_ranges(func, &mut overrides, &arena);

        let spans: Vec<(u32, u32, u32)> = ranges.iter().map(|r| (r.value, r.start, r.end)).collect();
        assert_eq!(spans, vec![(0, 0, 2), (1, 1, 2), (2, 2, 4), (3, 3, 4)]);
        assert!(!ranges[0].overlaps(&ranges[2]));
        assert!(ranges[0].overlaps(&ranges[1]));
    }

    #[test]
    fn test_coalesced_values_share_a_range() {
        let s = shader(
            "shader fragment
             entry main {
             b0:
                 %0 = fadd r0, r1
                 %1 = fadd r0, r2
                 %2:2 = vec %0, %1
                 uvsw.write %2:2, io0
             }",
        );
        let func = s.entrypoint().unwrap();
        let mut overrides = StorageOverrides::new(func.next_ssa);
        overrides.set(0, 2, 0);
        overrides.set(1, 2, 1);
        let arena = Bump::new();
        let ranges = compute_live_ranges(func, &mut overrides, &arena);

        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].value, ranges[0].start, ranges[0].end), (2, 0, 3));
    }
}
