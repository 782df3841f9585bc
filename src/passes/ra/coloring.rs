// Interference graph and greedy coloring for the register allocator. Nodes are SSA
// representatives keyed by their SSA index; each carries an allocation class describing
// how many contiguous registers it needs and which start registers are legal. Coloring is
// a pure function: nodes are visited in Welsh-Powell order (highest degree first, lowest
// index breaking ties) and each takes the lowest legal start register whose whole run is
// free of every already-colored neighbour's registers and of the reserved registers the
// input already names. Running out of registers is reported as AllocationFailed rather
// than spilling.

//! Interference graph coloring.

use hashbrown::{HashMap, HashSet};
use std::ops::Range;

use crate::core::{AllocationFailed, BitSet};

/// Contiguous-register allocation class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocClass {
    pub chans: u8,
    /// Legal first registers.
    pub starts: Range<u32>,
    /// Size of the register file the class lives in.
    pub num_regs: u32,
}

impl AllocClass {
    /// Class of `chans`-wide values in a file of `num_regs` registers.
    pub fn new(chans: u8, num_regs: u32) -> Self {
        let last = (num_regs + 1).saturating_sub(chans as u32);
        Self {
            chans,
            starts: 0..last,
            num_regs,
        }
    }
}

#[derive(Debug, Default)]
pub struct InterferenceGraph {
    /// Nodes in insertion order.
    nodes: Vec<u32>,
    classes: HashMap<u32, usize>,
    adjacency: HashMap<u32, HashSet<u32>>,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, value: u32, class: usize) {
        if self.classes.insert(value, class).is_none() {
            self.nodes.push(value);
            self.adjacency.insert(value, HashSet::new());
        }
    }

    pub fn add_edge(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|n| n.len()).sum::<usize>() / 2
    }

    pub fn class(&self, value: u32) -> Option<usize> {
        self.classes.get(&value).copied()
    }

    pub fn degree(&self, value: u32) -> usize {
        self.adjacency.get(&value).map_or(0, |n| n.len())
    }

    pub fn interferes(&self, a: u32, b: u32) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn neighbors(&self, value: u32) -> impl Iterator<Item = u32> + '_ {
        self.adjacency.get(&value).into_iter().flatten().copied()
    }

    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }
}

/// First register assigned to each node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coloring {
    regs: HashMap<u32, u32>,
}

impl Coloring {
    pub fn reg(&self, value: u32) -> Option<u32> {
        self.regs.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.regs.iter().map(|(&v, &r)| (v, r))
    }
}

/// Color `graph` with the registers of `classes`, never handing out a
/// register in `reserved`.
pub fn color(
    graph: &InterferenceGraph,
    classes: &[AllocClass],
    reserved: &BitSet,
) -> Result<Coloring, AllocationFailed> {
    let mut order = graph.nodes.clone();
    order.sort_by_key(|&v| (std::cmp::Reverse(graph.degree(v)), v));

    let num_regs = classes.iter().map(|c| c.num_regs).max().unwrap_or(0);
    let mut forbidden = BitSet::new(num_regs as usize);
    let mut coloring = Coloring::default();

    for value in order {
        let class = &classes[graph.classes[&value]];

        forbidden.clear_all();
        forbidden.union(reserved);
        for neighbor in graph.neighbors(value) {
            if let Some(reg) = coloring.reg(neighbor) {
                let width = classes[graph.classes[&neighbor]].chans;
                forbidden.insert_range(reg as usize, width as usize);
            }
        }

        let starts = class.starts.start as usize..class.starts.end as usize;
        let Some(reg) = forbidden.find_clear_run(starts, class.chans as usize) else {
            return Err(AllocationFailed::NoRegistersAvailable {
                value,
                chans: class.chans,
                temps: class.num_regs,
            });
        };
        log::trace!("ra: %{} -> r{} (degree {})", value, reg, graph.degree(value));
        coloring.regs.insert(value, reg as u32);
    }

    Ok(coloring)
}
