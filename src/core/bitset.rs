//! Dense bit sets over SSA indices and register numbers.
//!
//! Used for the optimizer's "used more than once" tracking and for the
//! allocator's per-node forbidden-register sets.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Create an empty set able to hold bits `0..len`.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Check if bit is set. Out-of-range bits are never set.
    pub fn contains(&self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Set a bit, returning whether it was newly set.
    pub fn insert(&mut self, bit: usize) -> bool {
        assert!(bit < self.len, "bit {} out of range {}", bit, self.len);
        let word = &mut self.words[bit / 64];
        let mask = 1u64 << (bit % 64);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    pub fn remove(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / 64] &= !(1u64 << (bit % 64));
        }
    }

    /// Set `bit..bit + count`, clipped to the capacity.
    pub fn insert_range(&mut self, bit: usize, count: usize) {
        for b in bit..(bit + count).min(self.len) {
            self.insert(b);
        }
    }

    /// Add every bit of `other` that fits in this set.
    pub fn union(&mut self, other: &BitSet) {
        for (word, theirs) in self.words.iter_mut().zip(&other.words) {
            *word |= theirs;
        }
        // Clip bits past our length in a shared last word.
        if self.len % 64 != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << (self.len % 64)) - 1;
            }
        }
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Lowest `start` in `starts` such that `start..start + run` is clear
    /// and inside the set.
    pub fn find_clear_run(&self, starts: std::ops::Range<usize>, run: usize) -> Option<usize> {
        starts
            .filter(|&start| start + run <= self.len)
            .find(|&start| (start..start + run).all(|b| !self.contains(b)))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&b| self.contains(b))
    }
}
