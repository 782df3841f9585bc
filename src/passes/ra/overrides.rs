//! Storage overrides for vector coalescing.
//!
//! An SSA value with an override does not get storage of its own: it lives
//! `offset` channels into the storage of `base`. Bases may themselves be
//! overridden; [`StorageOverrides::resolve`] follows the chain to the
//! representative and compresses the path it walked.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override {
    pub base: u32,
    pub offset: u32,
}

/// Override records indexed by SSA value.
#[derive(Debug, Clone, Default)]
pub struct StorageOverrides {
    records: Vec<Option<Override>>,
}

impl StorageOverrides {
    pub fn new(num_ssa: u32) -> Self {
        Self {
            records: vec![None; num_ssa as usize],
        }
    }

    pub fn is_overridden(&self, ssa: u32) -> bool {
        self.get(ssa).is_some()
    }

    pub fn get(&self, ssa: u32) -> Option<Override> {
        self.records.get(ssa as usize).copied().flatten()
    }

    /// Place `ssa` at `offset` channels into `base`. The value must not be
    /// overridden yet and must not be the representative of `base`.
    pub fn set(&mut self, ssa: u32, base: u32, offset: u32) {
        debug_assert!(!self.is_overridden(ssa));
        debug_assert_ne!(self.resolve(base).0, ssa, "override cycle through %{}", ssa);
        let index = ssa as usize;
        if index >= self.records.len() {
            self.records.resize(index + 1, None);
        }
        self.records[index] = Some(Override { base, offset });
    }

    /// Number of values placed inside another value's storage.
    pub fn count(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    /// Representative storage and channel offset of `ssa`.
    pub fn resolve(&mut self, ssa: u32) -> (u32, u32) {
        let mut path = Vec::new();
        let mut node = ssa;
        let mut offset = 0;
        while let Some(next) = self.get(node) {
            path.push((node, offset));
            offset += next.offset;
            node = next.base;
        }

        let root = node;
        for (member, before) in path {
            self.records[member as usize] = Some(Override {
                base: root,
                offset: offset - before,
            });
        }
        (root, offset)
    }
}
